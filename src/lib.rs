//! hashnav library exports for testing

pub mod core;
pub mod location;
pub mod persistence;

#[cfg(test)]
pub mod test_support;
