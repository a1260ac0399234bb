mod common;
mod initial_batch;
