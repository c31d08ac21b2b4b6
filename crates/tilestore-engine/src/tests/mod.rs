mod data_locks;
mod expr_bindings;
mod parallel_fill;
mod tile_scenario;
