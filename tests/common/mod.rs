#![allow(dead_code)]

use blowfish::Blowfish;
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};

use dzdl::decrypt::{derive, Key, CBC_BF_IV, CHUNK_SIZE};

pub const SECRET: &[u8] = b"abcdefghijklmnop";
pub const TRACK_ID: &str = "3135556";

pub fn key() -> Key {
    derive(SECRET, TRACK_ID).unwrap()
}

pub fn plaintext(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Applies the stripe scheme the way the encoder does.
pub fn encrypt_stripes(key: &Key, plaintext: &[u8]) -> Vec<u8> {
    let mut data = plaintext.to_vec();
    for (index, chunk) in data.chunks_mut(CHUNK_SIZE).enumerate() {
        if index % 3 == 0 && chunk.len() == CHUNK_SIZE {
            cbc::Encryptor::<Blowfish>::new_from_slices(&**key, CBC_BF_IV)
                .unwrap()
                .encrypt_padded_mut::<NoPadding>(chunk, CHUNK_SIZE)
                .unwrap();
        }
    }
    data
}
