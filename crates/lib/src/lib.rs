//! tfmirror-lib: building and promoting Terraform provider network mirrors
//!
//! A mirror is a static tree of files under a provider key prefix in a bucket:
//! - `index.json`: the versions the mirror holds ([`index::MirrorIndex`])
//! - `<version>.json`: the archives of one version ([`release::ReleaseManifest`])
//! - `<name>_<version>_<platform>_<arch>.zip`: one archive per target ([`archive`])
//!
//! [`artifacts::Artifacts`] keeps the index and manifests consistent while a
//! mirror is built, merged with its remote state, and published.
//! [`promote::promote`] copies a single version between mirrors.

pub mod archive;
pub mod artifacts;
pub mod consts;
pub mod discover;
pub mod index;
pub mod populate;
pub mod promote;
pub mod provider;
pub mod release;
pub mod store;
