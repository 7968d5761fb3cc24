mod address;
mod hash;
mod signature;

pub use address::{Address, AddressError};
pub use hash::{sha256, sha256_hex, Hash, HASH_SIZE};
pub use signature::{
    constant_time_compare, generate_broadcast_signature, verify_broadcast_signature,
    BROADCAST_SIGNATURE_HEADER,
};
