pub mod binding;
pub mod catalog;
pub mod index;
pub mod normalizer;
pub mod percept;
