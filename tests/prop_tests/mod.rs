#[path = "../integration_tests/_support.rs"]
mod _support;
mod prop_query;
