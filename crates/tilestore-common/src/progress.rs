use crate::StorageError;

/// Outcome of a computation that may yield before finishing.
///
/// `Pending` is not a failure: the caller retries later and the work resumes
/// where it stopped.
#[derive(Debug)]
pub enum Progress<T> {
    Done(T),
    Pending,
    Failed(StorageError),
}

impl<T> Progress<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Progress::Done(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Progress::Pending)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Progress::Done(v) => Progress::Done(f(v)),
            Progress::Pending => Progress::Pending,
            Progress::Failed(e) => Progress::Failed(e),
        }
    }

    /// `Ok(None)` means pending.
    pub fn into_result(self) -> Result<Option<T>, StorageError> {
        match self {
            Progress::Done(v) => Ok(Some(v)),
            Progress::Pending => Ok(None),
            Progress::Failed(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, StorageError>> for Progress<T> {
    fn from(r: Result<T, StorageError>) -> Self {
        match r {
            Ok(v) => Progress::Done(v),
            Err(e) => Progress::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_neither_success_nor_failure() {
        let p: Progress<u32> = Progress::Pending;
        assert!(p.is_pending());
        assert!(!p.is_done());
        assert!(matches!(p.into_result(), Ok(None)));

        let f: Progress<u32> = Err(StorageError::NoData("x".into())).into();
        assert!(f.into_result().is_err());

        let d = Progress::Done(2).map(|v| v * 21);
        assert!(matches!(d.into_result(), Ok(Some(42))));
    }
}
