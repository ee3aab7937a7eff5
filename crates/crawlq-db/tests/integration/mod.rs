mod common;
mod queue_store_tests;
