//! Minimal Solidity ABI encoding for the handful of calls we make
//!
//! Only static words (address, uint256, bool) and `string` are needed.

use alloy_primitives::{keccak256, Address, U256};

use super::ChainError;

/// Function argument
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

/// First four bytes of keccak256 of the canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode `selector ++ abi.encode(tokens)`
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_tokens(tokens));
    out
}

fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&word_from_u256(U256::from(head_len + tail.len())));
            tail.extend(encode_dynamic(token));
        } else {
            head.extend_from_slice(&encode_static(token));
        }
    }

    head.extend(tail);
    head
}

fn encode_static(token: &Token) -> [u8; 32] {
    match token {
        Token::Address(address) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            word
        }
        Token::Uint(value) => word_from_u256(*value),
        Token::Bool(value) => word_from_u256(U256::from(u8::from(*value))),
        Token::String(_) => [0u8; 32],
    }
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::String(value) => {
            let bytes = value.as_bytes();
            let padded_len = bytes.len().div_ceil(32) * 32;
            let mut out = Vec::with_capacity(32 + padded_len);
            out.extend_from_slice(&word_from_u256(U256::from(bytes.len())));
            out.extend_from_slice(bytes);
            out.resize(32 + padded_len, 0);
            out
        }
        other => encode_static(other).to_vec(),
    }
}

fn word_from_u256(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

/// Decode the first return word as uint256
pub fn decode_uint(data: &[u8]) -> Result<U256, ChainError> {
    let word = data
        .get(..32)
        .ok_or_else(|| ChainError::Decode(format!("expected 32-byte word, got {} bytes", data.len())))?;
    Ok(U256::from_be_slice(word))
}

/// Decode the first return word as bool (must be 0 or 1)
pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    let value = decode_uint(data)?;
    if value == U256::ZERO {
        Ok(false)
    } else if value == U256::from(1u8) {
        Ok(true)
    } else {
        Err(ChainError::Decode(format!("invalid bool word: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_well_known_selectors() {
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
    }

    #[test]
    fn test_encode_address_argument() {
        let owner = Address::from_str("f39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        let data = encode_call("balanceOf(address)", &[Token::Address(owner)]);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(
            hex::encode(&data[4..]),
            "000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_encode_string_tail() {
        let to = Address::from_str("0000000000000000000000000000000000000001").unwrap();
        let data = encode_call(
            "safeMint(address,string)",
            &[Token::Address(to), Token::String("ipfs://abc".to_string())],
        );
        let body = &data[4..];
        // head: address word + offset word, tail: length word + one padded data word
        assert_eq!(body.len(), 32 * 4);
        assert_eq!(decode_uint(&body[32..64]).unwrap(), U256::from(64u64));
        assert_eq!(decode_uint(&body[64..96]).unwrap(), U256::from(10u64));
        assert_eq!(&body[96..106], b"ipfs://abc");
        assert!(body[106..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_bool() {
        let mut word = [0u8; 32];
        assert!(!decode_bool(&word).unwrap());
        word[31] = 1;
        assert!(decode_bool(&word).unwrap());
        word[31] = 2;
        assert!(decode_bool(&word).is_err());
        assert!(decode_bool(&[]).is_err());
    }
}
