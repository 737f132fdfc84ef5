pub mod irc;
pub mod message;
pub mod tags;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;
