pub mod browse;
pub mod commit;
pub mod diff;
pub mod repo;
pub mod restore;
