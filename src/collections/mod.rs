//! Index-based intrusive list support shared by the buddy and slab layers.

pub mod chunk_list;
