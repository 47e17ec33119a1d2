//! Decoder for the agent's final prose answer
//!
//! Only used when the run produced no structured mint result (for example
//! when the agent reports a failure in words). Structured tool results always
//! take precedence.

use lazy_static::lazy_static;
use regex::Regex;

/// Overall reading of the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
    LimitReached,
    Unknown,
}

/// Everything recoverable from the answer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub verdict: Verdict,
    pub transaction_hash: Option<String>,
    pub block_number: Option<String>,
    pub metadata_hash: Option<String>,
    pub image_url: Option<String>,
}

const LIMIT_MARKERS: &[&str] = &["User has already minted"];

const FAILURE_MARKERS: &[&str] = &["MINTING FAILED", "Error uploading to IPFS"];

const SUCCESS_MARKERS: &[&str] = &[
    "Successfully minted your NFT",
    "NFT has been minted",
    "NFT has been successfully minted",
    "NFT MINTED SUCCESSFULLY",
    "MINTING COMPLETED",
    "NFT minting process has been successfully completed",
    "Transaction hash:",
    "NFT Transaction Hash:",
    "Minting Transaction Hash",
];

lazy_static! {
    static ref LABELLED_TX_HASH: Regex = Regex::new(
        r"(?i)(?:transaction hash|tx hash)[^0-9a-z]*(0x[a-f0-9]{64})\b"
    ).expect("valid regex");
    static ref ANY_TX_HASH: Regex = Regex::new(r"\b(0x[a-fA-F0-9]{64})\b").expect("valid regex");
    static ref BLOCK_NUMBER: Regex = Regex::new(
        r"(?i)(?:transaction confirmed in block|block number)[^:\n]*:[\s*\[`]*(\d+)"
    ).expect("valid regex");
    static ref METADATA_HASH: Regex = Regex::new(
        r"(?i)metadata ipfs hash[^:\n]*:[\s*\[`]*([a-z0-9]+)"
    ).expect("valid regex");
    static ref MARKDOWN_IMAGE_URL: Regex =
        Regex::new(r"\[FULL_DALLE_URL\]\((https://[^)\s]+)\)").expect("valid regex");
    static ref MARKER_IMAGE_URL: Regex =
        Regex::new(r"FULL_DALLE_URL:\s*(https://[^\s)\]]+)").expect("valid regex");
    static ref BLOB_IMAGE_URL: Regex = Regex::new(
        r"(https://oaidalleapiprodscus\.blob\.core\.windows\.net[^\s)\]]+)"
    ).expect("valid regex");
}

fn first_capture(patterns: &[&Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    })
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}

/// Classify `text` and pull out whatever mint details it mentions
pub fn decode(text: &str) -> DecodedResponse {
    let verdict = if contains_any(text, LIMIT_MARKERS) {
        Verdict::LimitReached
    } else if contains_any(text, FAILURE_MARKERS) {
        Verdict::Failure
    } else if contains_any(text, SUCCESS_MARKERS) {
        Verdict::Success
    } else {
        Verdict::Unknown
    };

    DecodedResponse {
        verdict,
        transaction_hash: first_capture(&[&LABELLED_TX_HASH, &ANY_TX_HASH], text),
        block_number: first_capture(&[&BLOCK_NUMBER], text),
        metadata_hash: first_capture(&[&METADATA_HASH], text),
        image_url: first_capture(&[&MARKDOWN_IMAGE_URL, &MARKER_IMAGE_URL, &BLOB_IMAGE_URL], text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(c: char) -> String {
        format!("0x{}", c.to_string().repeat(64))
    }

    #[test]
    fn test_success_answer() {
        let text = format!(
            "Your NFT has been successfully minted!\n\
             **NFT Transaction Hash:** [{}]\n\
             **Block Number:** 1234567\n\
             **Metadata IPFS Hash:** [bafkreiabc123]\n\
             **Image URL:** [FULL_DALLE_URL](https://oaidalleapiprodscus.blob.core.windows.net/private/img.png?sig=x)",
            hash('a')
        );
        let decoded = decode(&text);

        assert_eq!(decoded.verdict, Verdict::Success);
        assert_eq!(decoded.transaction_hash, Some(hash('a')));
        assert_eq!(decoded.block_number.as_deref(), Some("1234567"));
        assert_eq!(decoded.metadata_hash.as_deref(), Some("bafkreiabc123"));
        assert_eq!(
            decoded.image_url.as_deref(),
            Some("https://oaidalleapiprodscus.blob.core.windows.net/private/img.png?sig=x")
        );
    }

    #[test]
    fn test_labelled_hash_wins_over_other_hashes() {
        let text = format!("Image hash {} ... Transaction hash: {}", hash('b'), hash('c'));
        assert_eq!(decode(&text).transaction_hash, Some(hash('c')));
    }

    #[test]
    fn test_marker_image_url() {
        let decoded = decode("FULL_DALLE_URL:https://images.example/abc.png done");
        assert_eq!(decoded.image_url.as_deref(), Some("https://images.example/abc.png"));
    }

    #[test]
    fn test_raw_blob_url() {
        let decoded = decode("see https://oaidalleapiprodscus.blob.core.windows.net/x/y.png).");
        assert_eq!(
            decoded.image_url.as_deref(),
            Some("https://oaidalleapiprodscus.blob.core.windows.net/x/y.png")
        );
    }

    #[test]
    fn test_failure_markers() {
        assert_eq!(decode("MINTING FAILED: pin error").verdict, Verdict::Failure);
        assert_eq!(decode("Error uploading to IPFS").verdict, Verdict::Failure);
        assert_eq!(
            decode("MINTING FAILED because User has already minted").verdict,
            Verdict::LimitReached
        );
    }

    #[test]
    fn test_unknown_text() {
        let decoded = decode("I could not understand the request.");
        assert_eq!(decoded.verdict, Verdict::Unknown);
        assert!(decoded.transaction_hash.is_none());
        assert!(decoded.image_url.is_none());
    }

    #[test]
    fn test_block_number_confirmed_phrase() {
        let decoded = decode("Transaction confirmed in block: 99");
        assert_eq!(decoded.block_number.as_deref(), Some("99"));
    }
}
