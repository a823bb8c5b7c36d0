pub mod config;
pub mod db;
pub mod error;
pub mod frame;
pub mod ident;
pub mod object_store;
pub mod pipelines;
pub mod relational;
pub mod sink;
pub mod watermark;
