mod lifecycle_tests;
mod protocol_tests;
