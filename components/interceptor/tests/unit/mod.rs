//! Unit tests for page-level interception

mod test_xhr;
