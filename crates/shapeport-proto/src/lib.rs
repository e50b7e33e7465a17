//! Generated bindings for the ONNX IR (`onnx.proto`, proto3 flavour).
//!
//! Only the message definitions are generated; there is no service code.
//! `bytes` fields decode into [`bytes::Bytes`] so initializer payloads are
//! shared with the input buffer instead of copied.

pub mod onnx {
    include!(concat!(env!("OUT_DIR"), "/onnx.rs"));
}

pub use onnx::{
    AttributeProto, GraphProto, ModelProto, NodeProto, TensorProto, TensorShapeProto, TypeProto,
    ValueInfoProto,
};
