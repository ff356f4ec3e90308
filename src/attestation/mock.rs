use super::types::{AttestationDocument, VerifiedAttestation};
use super::{AttestationProvider, AttestationVerifier};
use crate::error::AttestError;

const MOCK_MARKER: &[u8] = b"MOCK_ATT_V1\0";

/// Mock attestation provider for testing. Produces a document containing the
/// length-prefixed nonce and public key.
///
/// # Security Warning
///
/// This provider performs **zero cryptographic verification** and must
/// never be used in production. Enable it only via `features = ["mock"]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AttestationProvider for MockProvider {
    fn attest(&self, nonce: &[u8], public_key: &[u8]) -> Result<AttestationDocument, AttestError> {
        let mut raw = Vec::with_capacity(MOCK_MARKER.len() + 8 + nonce.len() + public_key.len());
        raw.extend_from_slice(MOCK_MARKER);
        for field in [nonce, public_key] {
            raw.extend_from_slice(&(field.len() as u32).to_le_bytes());
            raw.extend_from_slice(field);
        }
        Ok(AttestationDocument::new(raw))
    }
}

/// Mock attestation verifier for testing. Accepts any document produced
/// by `MockProvider`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockVerifier;

impl MockVerifier {
    pub fn new() -> Self {
        Self
    }
}

fn take_field<'a>(raw: &'a [u8], offset: &mut usize) -> Result<Option<&'a [u8]>, AttestError> {
    let truncated = || AttestError::VerificationFailed("truncated mock document".to_string());
    let len_bytes = raw.get(*offset..*offset + 4).ok_or_else(truncated)?;
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    *offset += 4;
    if len == 0 {
        return Ok(None);
    }
    let field = raw.get(*offset..*offset + len).ok_or_else(truncated)?;
    *offset += len;
    Ok(Some(field))
}

impl AttestationVerifier for MockVerifier {
    fn verify(&self, doc: &AttestationDocument) -> Result<VerifiedAttestation, AttestError> {
        let raw = &doc.raw;
        if !raw.starts_with(MOCK_MARKER) {
            return Err(AttestError::VerificationFailed(
                "not a mock attestation document".to_string(),
            ));
        }

        let mut offset = MOCK_MARKER.len();
        let nonce = take_field(raw, &mut offset)?.map(<[u8]>::to_vec);
        let public_key = take_field(raw, &mut offset)?.map(<[u8]>::to_vec);
        if offset != raw.len() {
            return Err(AttestError::VerificationFailed(
                "trailing bytes in mock document".to_string(),
            ));
        }

        Ok(VerifiedAttestation {
            document_hash: doc.hash(),
            public_key,
            nonce,
            measurements: Vec::new(),
        })
    }
}

/// Mock verifier that returns configurable measurement values.
///
/// Delegates parsing to [`MockVerifier`], then overrides `measurements`.
#[derive(Debug, Clone)]
pub struct MockVerifierWithMeasurements {
    measurements: Vec<Vec<u8>>,
}

impl MockVerifierWithMeasurements {
    pub fn new(measurements: Vec<Vec<u8>>) -> Self {
        Self { measurements }
    }
}

impl AttestationVerifier for MockVerifierWithMeasurements {
    fn verify(&self, doc: &AttestationDocument) -> Result<VerifiedAttestation, AttestError> {
        let mut result = MockVerifier.verify(doc)?;
        result.measurements = self.measurements.clone();
        Ok(result)
    }
}
