pub mod messages;
pub mod notifications;
pub mod profiles;
pub mod streaming;

#[cfg(test)]
mod handler_tests;
