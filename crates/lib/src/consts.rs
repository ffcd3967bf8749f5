//! Well-known file names and content types for the mirror layout.

/// Name of the version index at the root of a provider's key prefix.
pub const INDEX_FILENAME: &str = "index.json";

/// Content type used when uploading `.zip` archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Content type used when uploading `.json` index and manifest documents.
pub const METADATA_CONTENT_TYPE: &str = "application/json";

/// Fallback content type for anything else found in the staging directory.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Prefix of the Terraform `h1:` zip hash.
pub const H1_HASH_PREFIX: &str = "h1:";

/// Returns the content type for a staged file name based on its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
  if file_name.ends_with(".zip") {
    ARCHIVE_CONTENT_TYPE
  } else if file_name.ends_with(".json") {
    METADATA_CONTENT_TYPE
  } else {
    DEFAULT_CONTENT_TYPE
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_type_by_extension() {
    assert_eq!(content_type_for("terraform-provider-x_1.0.0_linux_amd64.zip"), ARCHIVE_CONTENT_TYPE);
    assert_eq!(content_type_for("index.json"), METADATA_CONTENT_TYPE);
    assert_eq!(content_type_for("1.0.0.json"), METADATA_CONTENT_TYPE);
    assert_eq!(content_type_for("README"), DEFAULT_CONTENT_TYPE);
  }
}
