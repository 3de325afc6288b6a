//! Protobuf types of the bitswap wire format.
//!
//! ```protobuf
//! message Message {
//!   message Wantlist {
//!     message Entry {
//!       bytes block = 1;
//!       int32 priority = 2;
//!       bool cancel = 3;
//!     }
//!     repeated Entry entries = 1;
//!     bool full = 2;
//!   }
//!   message Block {
//!     bytes prefix = 1;
//!     bytes data = 2;
//!   }
//!   Wantlist wantlist = 1;
//!   repeated bytes blocks = 2;
//!   repeated Block payload = 3;
//! }
//! ```
#![allow(clippy::all)]

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(message, optional, tag = "1")]
    pub wantlist: ::core::option::Option<message::Wantlist>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub blocks: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(message, repeated, tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<message::Block>,
}

pub mod message {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Wantlist {
        #[prost(message, repeated, tag = "1")]
        pub entries: ::prost::alloc::vec::Vec<wantlist::Entry>,
        #[prost(bool, tag = "2")]
        pub full: bool,
    }

    pub mod wantlist {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Entry {
            #[prost(bytes = "vec", tag = "1")]
            pub block: ::prost::alloc::vec::Vec<u8>,
            #[prost(int32, tag = "2")]
            pub priority: i32,
            #[prost(bool, tag = "3")]
            pub cancel: bool,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(bytes = "vec", tag = "1")]
        pub prefix: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub data: ::prost::alloc::vec::Vec<u8>,
    }
}
