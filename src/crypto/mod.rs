//! The two halves of Maven's password encryption scheme: the cipher handles
//! the byte format and key derivation, the dispatcher handles token
//! decoration and master-password resolution. They are split so either side
//! can be exercised against fixed vectors on its own.

pub mod cipher;
pub mod dispatcher;
