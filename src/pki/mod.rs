//! Cluster PKI generator (§4.2).
//!
//! Produces a self-consistent certificate chain for a cluster: a root CA,
//! an admin client certificate, an API server certificate (SAN covers the
//! controller ELB, the configured API DNS names, controller IPs, and the
//! cluster API IP) and a worker certificate. Key material is generated
//! with `openssl`, the crate the wider retrieved pack already reaches for
//! when handling X.509 (see DESIGN.md).

use std::net::IpAddr;

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509, X509Builder};

use crate::errors::PkiError;

const RSA_KEY_BITS: u32 = 2048;
const CA_VALIDITY_DAYS: u32 = 365 * 10;
const LEAF_VALIDITY_DAYS: u32 = 365 * 2;

pub struct KeyPair {
    pub name: String,
    pub certificate_pem: Vec<u8>,
    pub private_key_pem: Vec<u8>,
}

pub struct ClusterPki {
    pub ca: KeyPair,
    pub admin: KeyPair,
    pub apiserver: KeyPair,
    pub worker: KeyPair,
}

/// SAN inputs for the API server certificate (§4.2, scenario 6 in §8).
pub struct ApiServerSan {
    pub controller_elb_dns: String,
    pub kubernetes_api_dns_names: Vec<String>,
    pub controller_ips: Vec<IpAddr>,
    pub kubernetes_api_ip: IpAddr,
}

fn rsa_keypair() -> Result<PKey<Private>, PkiError> {
    let rsa = Rsa::generate(RSA_KEY_BITS).map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
    PKey::from_rsa(rsa).map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

fn random_serial() -> Result<Asn1Integer, PkiError> {
    // 64-bit random serial, per §4.2.
    let mut bn = BigNum::new().map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
    bn.rand(63, MsbOption::MAYBE_ZERO, false)
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
    bn.to_asn1_integer().map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

fn subject(cn: &str) -> Result<X509Name, PkiError> {
    let mut builder = X509NameBuilder::new().map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.append_entry_by_text("CN", cn).map_err(|e| PkiError::Signing(e.to_string()))?;
    Ok(builder.build())
}

/// Builds the self-signed cluster root CA.
fn build_ca(cluster_name: &str) -> Result<(X509, PKey<Private>), PkiError> {
    let key = rsa_keypair()?;
    let name = subject(&format!("{cluster_name}-ca"))?;

    let mut builder = X509Builder::new().map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_version(2).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_serial_number(&random_serial()?).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_subject_name(&name).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_issuer_name(&name).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder
        .set_not_before(&Asn1Time::days_from_now(0).map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder
        .set_not_after(&Asn1Time::days_from_now(CA_VALIDITY_DAYS).map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_pubkey(&key).map_err(|e| PkiError::Signing(e.to_string()))?;

    builder
        .append_extension(BasicConstraints::new().ca().build().map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    let ctx = builder.x509v3_context(None, None);
    let skid = SubjectKeyIdentifier::new()
        .build(&ctx)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.append_extension(skid).map_err(|e| PkiError::Signing(e.to_string()))?;
    let ctx = builder.x509v3_context(None, None);
    let akid = AuthorityKeyIdentifier::new()
        .keyid(true)
        .issuer(true)
        .build(&ctx)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.append_extension(akid).map_err(|e| PkiError::Signing(e.to_string()))?;

    builder
        .sign(&key, MessageDigest::sha256())
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    Ok((builder.build(), key))
}

struct LeafSpec<'a> {
    cn: &'a str,
    is_ca: bool,
    key_usage: Option<KeyUsage>,
    ext_key_usage: Option<ExtendedKeyUsage>,
    san: Option<SubjectAlternativeName>,
}

fn build_leaf(spec: LeafSpec<'_>, ca_cert: &X509, ca_key: &PKey<Private>) -> Result<(X509, PKey<Private>), PkiError> {
    let key = rsa_keypair()?;
    let name = subject(spec.cn)?;

    let mut builder = X509Builder::new().map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_version(2).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_serial_number(&random_serial()?).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_subject_name(&name).map_err(|e| PkiError::Signing(e.to_string()))?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder
        .set_not_before(&Asn1Time::days_from_now(0).map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder
        .set_not_after(&Asn1Time::days_from_now(LEAF_VALIDITY_DAYS).map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;
    builder.set_pubkey(&key).map_err(|e| PkiError::Signing(e.to_string()))?;

    let mut basic_constraints = BasicConstraints::new();
    if spec.is_ca {
        basic_constraints.ca();
    }
    builder
        .append_extension(basic_constraints.build().map_err(|e| PkiError::Signing(e.to_string()))?)
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    if let Some(ku) = spec.key_usage {
        builder.append_extension(ku.build().map_err(|e| PkiError::Signing(e.to_string()))?).map_err(|e| PkiError::Signing(e.to_string()))?;
    }
    if let Some(eku) = spec.ext_key_usage {
        builder
            .append_extension(eku.build().map_err(|e| PkiError::Signing(e.to_string()))?)
            .map_err(|e| PkiError::Signing(e.to_string()))?;
    }
    if let Some(san) = spec.san {
        let ctx = builder.x509v3_context(Some(ca_cert), None);
        let san_ext = san.build(&ctx).map_err(|e| PkiError::Signing(e.to_string()))?;
        builder.append_extension(san_ext).map_err(|e| PkiError::Signing(e.to_string()))?;
    }

    builder.sign(ca_key, MessageDigest::sha256()).map_err(|e| PkiError::Signing(e.to_string()))?;

    Ok((builder.build(), key))
}

fn to_keypair(name: impl Into<String>, cert: X509, key: PKey<Private>) -> Result<KeyPair, PkiError> {
    Ok(KeyPair {
        name: name.into(),
        certificate_pem: cert.to_pem().map_err(|e| PkiError::Signing(e.to_string()))?,
        private_key_pem: key.private_key_to_pem_pkcs8().map_err(|e| PkiError::Signing(e.to_string()))?,
    })
}

/// Generates the full chain for `cluster_name`. `apiserver_san` supplies
/// the dynamic SAN entries the API server certificate must carry.
pub fn generate_cluster_pki(cluster_name: &str, apiserver_san: &ApiServerSan) -> Result<ClusterPki, PkiError> {
    let (ca_cert, ca_key) = build_ca(cluster_name)?;
    let ca = to_keypair(format!("{cluster_name}-ca"), ca_cert.clone(), ca_key.clone())?;

    let (admin_cert, admin_key) = build_leaf(
        LeafSpec {
            cn: &format!("{cluster_name}-admin"),
            is_ca: false,
            key_usage: None,
            ext_key_usage: None,
            san: None,
        },
        &ca_cert,
        &ca_key,
    )?;
    let admin = to_keypair(format!("{cluster_name}-admin"), admin_cert, admin_key)?;

    let mut apiserver_san_ext = SubjectAlternativeName::new();
    apiserver_san_ext.dns(&apiserver_san.controller_elb_dns);
    for dns in &apiserver_san.kubernetes_api_dns_names {
        apiserver_san_ext.dns(dns);
    }
    for ip in &apiserver_san.controller_ips {
        apiserver_san_ext.ip(&ip.to_string());
    }
    apiserver_san_ext.ip(&apiserver_san.kubernetes_api_ip.to_string());

    let (apiserver_cert, apiserver_key) = build_leaf(
        LeafSpec {
            cn: &format!("{cluster_name}-apiserver"),
            is_ca: false,
            key_usage: Some({
                let mut ku = KeyUsage::new();
                ku.digital_signature().key_encipherment();
                ku
            }),
            ext_key_usage: None,
            san: Some(apiserver_san_ext),
        },
        &ca_cert,
        &ca_key,
    )?;
    let apiserver = to_keypair(format!("{cluster_name}-apiserver"), apiserver_cert, apiserver_key)?;

    let mut worker_san_ext = SubjectAlternativeName::new();
    worker_san_ext.dns("*.*.compute.internal");
    worker_san_ext.dns("*.ec2.internal");

    let (worker_cert, worker_key) = build_leaf(
        LeafSpec {
            cn: &format!("{cluster_name}-worker"),
            is_ca: false,
            key_usage: None,
            ext_key_usage: None,
            san: Some(worker_san_ext),
        },
        &ca_cert,
        &ca_key,
    )?;
    let worker = to_keypair(format!("{cluster_name}-worker"), worker_cert, worker_key)?;

    Ok(ClusterPki { ca, admin, apiserver, worker })
}

/// Every `(name, pem)` pair that should be uploaded to
/// `<cluster>/credentials/<name>.pem`, per §4.2.
impl ClusterPki {
    pub fn credential_files(&self) -> Vec<(&str, &[u8])> {
        vec![
            ("ca", &self.ca.certificate_pem),
            ("ca-key", &self.ca.private_key_pem),
            ("admin", &self.admin.certificate_pem),
            ("admin-key", &self.admin.private_key_pem),
            ("apiserver", &self.apiserver.certificate_pem),
            ("apiserver-key", &self.apiserver.private_key_pem),
            ("worker", &self.worker.certificate_pem),
            ("worker-key", &self.worker.private_key_pem),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::x509::X509;

    #[test]
    fn apiserver_certificate_san_matches_spec_scenario() {
        let san = ApiServerSan {
            controller_elb_dns: "cluster-elb.us-east-1.elb.amazonaws.com".to_string(),
            kubernetes_api_dns_names: vec!["kubernetes".to_string(), "kubernetes.default".to_string()],
            controller_ips: vec!["10.0.0.50".parse().unwrap()],
            kubernetes_api_ip: "10.0.16.1".parse().unwrap(),
        };

        let pki = generate_cluster_pki("test-cluster", &san).expect("pki generation succeeds");
        let cert = X509::from_pem(&pki.apiserver.certificate_pem).expect("valid pem");

        let names: Vec<String> = cert
            .subject_alt_names()
            .expect("apiserver cert carries a SAN extension")
            .iter()
            .map(|n| {
                if let Some(dns) = n.dnsname() {
                    format!("DNS:{dns}")
                } else if let Some(ip) = n.ipaddress() {
                    format!("IP:{}", std::net::IpAddr::from(<[u8; 4]>::try_from(ip).unwrap()))
                } else {
                    "unknown".to_string()
                }
            })
            .collect();

        assert_eq!(names.len(), 5);
        assert!(names.contains(&"DNS:cluster-elb.us-east-1.elb.amazonaws.com".to_string()));
        assert!(names.contains(&"DNS:kubernetes".to_string()));
        assert!(names.contains(&"DNS:kubernetes.default".to_string()));
        assert!(names.contains(&"IP:10.0.0.50".to_string()));
        assert!(names.contains(&"IP:10.0.16.1".to_string()));
    }

    #[test]
    fn worker_certificate_has_wildcard_internal_san() {
        let san = ApiServerSan {
            controller_elb_dns: "elb".to_string(),
            kubernetes_api_dns_names: vec![],
            controller_ips: vec![],
            kubernetes_api_ip: "10.0.0.1".parse().unwrap(),
        };
        let pki = generate_cluster_pki("test-cluster", &san).unwrap();
        let cert = X509::from_pem(&pki.worker.certificate_pem).unwrap();
        let names: Vec<String> = cert
            .subject_alt_names()
            .unwrap()
            .iter()
            .filter_map(|n| n.dnsname().map(str::to_string))
            .collect();
        assert!(names.contains(&"*.*.compute.internal".to_string()));
        assert!(names.contains(&"*.ec2.internal".to_string()));
    }
}
