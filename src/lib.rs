pub mod completion;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod middleware;
pub mod server;
#[cfg(test)]
mod test_utils;
