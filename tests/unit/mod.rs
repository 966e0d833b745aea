//! Unit tests for the data model, configuration and storage helpers

mod config_test;
mod models_test;
mod storage_test;
