//! PEM/X.509 helpers and certificate key material.

use chrono::{DateTime, Utc};
use pem::{EncodeConfig, LineEnding, Pem};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use x509_parser::extensions::{GeneralName, ParsedExtension};

use crate::error::PkiError;

/// PEM tag of X.509 certificates
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// id-ad-caIssuers (RFC 5280 4.2.2.1)
const OID_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Facts the renewer needs from a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// End of the validity period
    pub not_after: DateTime<Utc>,
    /// Whether an Authority Information Access extension is present
    pub has_authority_info_access: bool,
    /// First "CA Issuers" URI of the AIA extension
    pub ca_issuer_uri: Option<String>,
}

impl CertificateInfo {
    /// Inspect a DER encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self, PkiError> {
        let (_, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| PkiError::X509(e.to_string()))?;

        let timestamp = cert.validity().not_after.timestamp();
        let not_after = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| PkiError::X509(format!("not-after out of range: {}", timestamp)))?;

        let mut has_authority_info_access = false;
        let mut ca_issuer_uri = None;

        for ext in cert.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                has_authority_info_access = true;
                ca_issuer_uri = aia
                    .accessdescs
                    .iter()
                    .filter(|desc| desc.access_method.to_id_string() == OID_CA_ISSUERS)
                    .find_map(|desc| match &desc.access_location {
                        GeneralName::URI(uri) => Some(uri.to_string()),
                        _ => None,
                    });
            }
        }

        Ok(Self {
            not_after,
            has_authority_info_access,
            ca_issuer_uri,
        })
    }
}

/// Every certificate of a PEM bundle, as DER, in bundle order
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, PkiError> {
    let blocks = pem::parse_many(pem_data).map_err(|e| PkiError::Pem(e.to_string()))?;

    let certificates: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|block| block.tag() == CERTIFICATE_TAG)
        .map(|block| block.into_contents())
        .collect();

    if certificates.is_empty() {
        return Err(PkiError::Empty);
    }
    Ok(certificates)
}

/// A single certificate delivered either as PEM or as raw DER
///
/// Issuer URIs commonly serve DER (`application/pkix-cert`), but some
/// responders return PEM.
pub fn certificate_der(data: &[u8]) -> Result<Vec<u8>, PkiError> {
    if data.is_empty() {
        return Err(PkiError::Empty);
    }

    if data.trim_ascii_start().starts_with(b"-----BEGIN") {
        let mut certificates = parse_pem_certificates(data)?;
        return Ok(certificates.swap_remove(0));
    }

    Ok(data.to_vec())
}

/// PEM encode a DER certificate with LF line endings
pub fn der_to_pem(der: &[u8]) -> String {
    pem::encode_config(
        &Pem::new(CERTIFICATE_TAG, der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

/// Fresh key pair for a new certificate
pub fn generate_certificate_key() -> Result<KeyPair, PkiError> {
    Ok(KeyPair::generate()?)
}

/// DER encoded CSR naming `common_name` and covering every name in `names`
pub fn certificate_signing_request(
    key_pair: &KeyPair,
    common_name: &str,
    names: &[String],
) -> Result<Vec<u8>, PkiError> {
    let mut params = CertificateParams::new(names.to_vec())?;

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name.to_string());
    params.distinguished_name = distinguished_name;

    let csr = params.serialize_request(key_pair)?;
    Ok(csr.der().to_vec())
}
