pub mod attributes;
pub mod boot;
pub mod index;
pub mod record;
pub mod runlist;
pub mod utils;
