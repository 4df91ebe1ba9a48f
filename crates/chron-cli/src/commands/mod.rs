pub mod diff;
pub mod dispatch;
pub mod entity;
pub mod revisions;
pub mod schema;
mod shared;

#[cfg(test)]
pub(crate) mod test_support;
