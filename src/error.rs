//! Typed failures for the two layers that need them: external-command
//! execution and certificate validation. Everything else propagates
//! `Box<dyn Error>` up to the orchestrator, which exits non-zero.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmdError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with status {status}: {stderr}")]
    Failed {
        program: String,
        status: i32,
        stderr: String,
    },
}

/// One variant per validation primitive so the fatal diagnostic always
/// names which check failed and the offending path.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{}: not a parseable private key: {detail}", path.display())]
    BadPrivateKey { path: PathBuf, detail: String },

    #[error("{}: not a parseable certificate request: {detail}", path.display())]
    BadCsr { path: PathBuf, detail: String },

    #[error("{}: certificate request subject has no Organization (O=) field", path.display())]
    CsrMissingOrg { path: PathBuf },

    #[error("{}: not a parseable X.509 certificate: {detail}", path.display())]
    BadCertificate { path: PathBuf, detail: String },

    #[error("private key {} does not match certificate {} (public-key digests differ)", key.display(), cert.display())]
    KeyMismatch { key: PathBuf, cert: PathBuf },

    #[error("{}: certificate does not cover '{domain}' (names: {names})", path.display())]
    DomainNotCovered {
        path: PathBuf,
        domain: String,
        names: String,
    },

    #[error("{}: output path is not usable: {detail}", path.display())]
    BadOutputPath { path: PathBuf, detail: String },

    #[error(transparent)]
    Cmd(#[from] CmdError),
}
