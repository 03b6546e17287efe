use crate::RepoPath;

/// Artifact class driving the cache expiry decision table.
///
/// Maven distinguishes immutable timestamp-qualified snapshot builds
/// (`foo-1.0-20240115.103000-3.jar`) from mutable bare `-SNAPSHOT` artifacts
/// (`foo-1.0-SNAPSHOT.jar`). Release artifacts and unique snapshots never go
/// stale; everything published under a reusable name can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    /// Plain release artifact, no snapshot marker anywhere in the path.
    Release,
    /// Timestamp-qualified snapshot file. Content is immutable once published.
    UniqueSnapshot,
    /// Bare `-SNAPSHOT` file. Re-published in place, subject to expiry.
    NonUniqueSnapshot,
    /// `maven-metadata.xml` (or its checksum) under a release path.
    ReleaseMetadata,
    /// `maven-metadata.xml` (or its checksum) under a snapshot path.
    SnapshotMetadata,
}

impl ArtifactClass {
    pub fn is_metadata(self) -> bool {
        matches!(self, Self::ReleaseMetadata | Self::SnapshotMetadata)
    }

    pub fn is_snapshot(self) -> bool {
        matches!(
            self,
            Self::UniqueSnapshot | Self::NonUniqueSnapshot | Self::SnapshotMetadata
        )
    }
}

/// Classify a repository path for expiry purposes.
pub fn classify(rp: &RepoPath) -> ArtifactClass {
    let name = rp.name().unwrap_or("");
    let under_snapshot = rp.path().contains("-SNAPSHOT");

    if is_metadata_name(name) {
        return if under_snapshot {
            ArtifactClass::SnapshotMetadata
        } else {
            ArtifactClass::ReleaseMetadata
        };
    }

    if has_unique_snapshot_timestamp(name) {
        return ArtifactClass::UniqueSnapshot;
    }

    if under_snapshot {
        return ArtifactClass::NonUniqueSnapshot;
    }

    ArtifactClass::Release
}

fn is_metadata_name(name: &str) -> bool {
    // Covers maven-metadata.xml and its checksum companions
    // (maven-metadata.xml.sha1 etc).
    name.starts_with("maven-metadata.xml")
}

/// Detects the `-yyyyMMdd.HHmmss-N` qualifier of a unique snapshot filename.
fn has_unique_snapshot_timestamp(name: &str) -> bool {
    let bytes = name.as_bytes();
    let mut i = 0;
    while let Some(offset) = name[i..].find('-') {
        let start = i + offset + 1;
        if timestamp_at(bytes, start) {
            return true;
        }
        i = start;
    }
    false
}

fn timestamp_at(bytes: &[u8], start: usize) -> bool {
    // 8 digits, '.', 6 digits, '-', at least one build-number digit.
    let rest = &bytes[start.min(bytes.len())..];
    if rest.len() < 17 {
        return false;
    }
    if !rest[..8].iter().all(u8::is_ascii_digit) || rest[8] != b'.' {
        return false;
    }
    if !rest[9..15].iter().all(u8::is_ascii_digit) || rest[15] != b'-' {
        return false;
    }
    rest[16].is_ascii_digit()
}
