pub mod extraction;
pub mod registry;
pub mod validation;
pub mod presenter;
pub mod assembly;
