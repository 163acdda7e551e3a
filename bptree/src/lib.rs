pub mod codec;
pub mod manifest;
pub mod node;
pub mod node_file;
pub mod remote;
pub mod search;
pub mod tree;

pub use codec::Converter;
pub use manifest::IndexManifest;
pub use node::{InternalNode, LeafNode, Node};
pub use node_file::TreeFile;
pub use remote::{DirRemoteStore, RemoteStore};
pub use tree::BPlusTree;
