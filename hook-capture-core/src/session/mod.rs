pub(crate) mod capture_loop;
pub mod capture_session;
pub mod coordinator;
pub mod registry;
