/// Still images for slide image regions.
pub mod store;
