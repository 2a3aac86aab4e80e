pub mod image_xobject;
pub mod masker;
pub mod reader;
