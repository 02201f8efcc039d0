mod connection_edge_tests;
mod evaluator_failure_tests;
mod resource_limit_tests;
