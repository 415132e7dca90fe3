mod data_test;
mod run_log_test;
