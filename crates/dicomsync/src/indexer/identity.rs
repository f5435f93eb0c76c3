//! Content identity derivation.

use super::dicom::{read_hierarchy, DicomError};
use dicomsync_ids::InstanceId;

const GROUPING_KEY_LEN: usize = 10;

/// Identity of recognized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub instance: InstanceId,
    /// Folder name that groups pushed files of the same series, if any
    pub grouping_key: Option<String>,
}

/// Maps content bytes to a canonical identity. `Err` means the content is
/// not recognized and is handled as opaque.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, content: &[u8]) -> Result<ResolvedIdentity, DicomError>;
}

/// Resolver for DICOM Part-10 content.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomIdentityResolver;

impl IdentityResolver for DicomIdentityResolver {
    fn resolve(&self, content: &[u8]) -> Result<ResolvedIdentity, DicomError> {
        let hierarchy = read_hierarchy(content)?;
        Ok(ResolvedIdentity {
            instance: InstanceId::from_hierarchy(
                &hierarchy.patient_id,
                &hierarchy.study_uid,
                &hierarchy.series_uid,
                &hierarchy.sop_uid,
            ),
            grouping_key: Some(grouping_key(&hierarchy.series_uid)),
        })
    }
}

/// First ten hex digits of the MD5 of a series UID.
pub fn grouping_key(series_uid: &str) -> String {
    let digest = format!("{:x}", md5::compute(series_uid.as_bytes()));
    digest[..GROUPING_KEY_LEN].to_string()
}
