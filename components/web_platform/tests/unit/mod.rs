//! Unit tests for the web platform model

mod test_lifecycle;
mod test_messaging;
mod test_page;
