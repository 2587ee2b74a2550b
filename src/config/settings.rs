//! Configuration settings for BucketSync
//!
//! Defines the sync target model, upload parameter rules, engine tuning,
//! config file loading and CLI arguments. Defaults are applied once here;
//! everything downstream works with fully-populated typed values.

use crate::error::{IoResultExt, Result, SyncError};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of concurrent transfer units
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default retry budget for transient store failures
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// BucketSync - mirror local directories to S3 prefixes
#[derive(Parser, Debug, Clone)]
#[command(name = "bucketsync")]
#[command(author = "BucketSync Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sync local directories to S3 bucket prefixes")]
#[command(long_about = r#"
BucketSync mirrors local directory trees to S3 bucket prefixes during a
deploy and removes the synced objects on teardown.

Examples:
  bucketsync sync                      # artifact targets, then deploy targets
  bucketsync sync --phase artifact     # only targets marked artifact = true
  bucketsync sync --dry-run            # print the plan, transfer nothing
  bucketsync clear                     # delete every object under each prefix
"#)]
pub struct CliArgs {
    /// Config file (TOML, or JSON when the extension is .json)
    #[arg(
        short = 'c',
        long,
        default_value = "bucketsync.toml",
        env = "BUCKETSYNC_CONFIG",
        value_name = "PATH"
    )]
    pub config: PathBuf,

    /// Override the configured number of concurrent transfers
    #[arg(short = 'j', long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Show progress bars instead of dot ticks
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sync configured directories to their bucket prefixes
    #[command(name = "sync")]
    Sync {
        /// Which targets to run
        #[arg(long, value_enum, default_value = "all")]
        phase: Phase,
        /// Print the plan without transferring anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Delete every object under each configured prefix
    #[command(name = "clear")]
    Clear {
        /// List what would be deleted without deleting
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

/// Deploy phase selecting which targets run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Targets with `artifact = true`, run while artifacts are uploaded
    Artifact,
    /// Targets with `artifact = false`, run after the deploy
    Deploy,
    /// Artifact phase followed by deploy phase
    #[default]
    All,
}

impl Phase {
    /// Whether a target belongs to this phase
    pub fn includes(&self, target: &SyncTarget) -> bool {
        match self {
            Phase::Artifact => target.artifact,
            Phase::Deploy => !target.artifact,
            Phase::All => true,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Canned ACL applied to uploaded objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Owner-only access
    #[default]
    Private,
    /// Anyone can read
    PublicRead,
    /// Anyone can read and write
    PublicReadWrite,
    /// Any authenticated AWS principal can read
    AuthenticatedRead,
    /// EC2 can read AMI bundles
    AwsExecRead,
    /// Bucket owner can read
    BucketOwnerRead,
    /// Bucket owner has full control
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Wire name understood by S3
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::AwsExecRead => "aws-exec-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Per-object upload parameters
///
/// Every scalar is optional so that rule sets can be layered: a later
/// layer only replaces the keys it sets. Keys accept both snake_case and
/// the PascalCase spellings used by the S3 API. Unknown keys are
/// rejected so that a misspelled header fails the config load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectParams {
    /// Canned ACL override
    #[serde(default, alias = "ACL", alias = "Acl", skip_serializing_if = "Option::is_none")]
    pub acl: Option<CannedAcl>,
    /// Cache-Control header
    #[serde(default, alias = "CacheControl", skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Content-Type header
    #[serde(default, alias = "ContentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content-Encoding header
    #[serde(default, alias = "ContentEncoding", skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Content-Disposition header
    #[serde(default, alias = "ContentDisposition", skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Content-Language header
    #[serde(default, alias = "ContentLanguage", skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Storage class (STANDARD, STANDARD_IA, ...)
    #[serde(default, alias = "StorageClass", skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Server-side encryption (AES256, aws:kms)
    #[serde(default, alias = "ServerSideEncryption", skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
    /// KMS key for `aws:kms` encryption
    #[serde(
        default,
        alias = "SSEKMSKeyId",
        alias = "sse_kms_key_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssekms_key_id: Option<String>,
    /// Redirect served by static website hosting
    #[serde(default, alias = "WebsiteRedirectLocation", skip_serializing_if = "Option::is_none")]
    pub website_redirect_location: Option<String>,
    /// User metadata (x-amz-meta-*)
    #[serde(default, alias = "Metadata", skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ObjectParams {
    /// Layer `other` on top of `self`: keys set in `other` win
    pub fn merge(&mut self, other: &ObjectParams) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.acl, &other.acl);
        take(&mut self.cache_control, &other.cache_control);
        take(&mut self.content_type, &other.content_type);
        take(&mut self.content_encoding, &other.content_encoding);
        take(&mut self.content_disposition, &other.content_disposition);
        take(&mut self.content_language, &other.content_language);
        take(&mut self.storage_class, &other.storage_class);
        take(&mut self.server_side_encryption, &other.server_side_encryption);
        take(&mut self.ssekms_key_id, &other.ssekms_key_id);
        take(&mut self.website_redirect_location, &other.website_redirect_location);
        for (key, value) in &other.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// True when no key is set
    pub fn is_empty(&self) -> bool {
        *self == ObjectParams::default()
    }
}

/// One glob rule: files matching `glob` receive `params`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParamRule")]
pub struct ParamRule {
    /// Glob matched against the `/`-separated path relative to the local directory
    pub glob: String,
    /// Parameters applied on match
    pub params: ObjectParams,
}

impl ParamRule {
    /// Create a rule
    pub fn new(glob: impl Into<String>, params: ObjectParams) -> Self {
        Self {
            glob: glob.into(),
            params,
        }
    }
}

/// Accepted spellings of a rule: `{ glob, params }` or `{ "<glob>": { ... } }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawParamRule {
    Explicit {
        glob: String,
        #[serde(default)]
        params: ObjectParams,
    },
    Shorthand(BTreeMap<String, ObjectParams>),
}

impl TryFrom<RawParamRule> for ParamRule {
    type Error = String;

    fn try_from(raw: RawParamRule) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawParamRule::Explicit { glob, params } => Ok(ParamRule { glob, params }),
            RawParamRule::Shorthand(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "shorthand param rule must have exactly one glob key, found {}",
                        map.len()
                    ));
                }
                let (glob, params) = map
                    .into_iter()
                    .next()
                    .ok_or_else(|| "empty param rule".to_string())?;
                Ok(ParamRule { glob, params })
            }
        }
    }
}

fn default_true() -> bool {
    true
}

/// One configured (local directory, bucket + prefix) pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncTarget {
    /// Local directory to mirror
    #[serde(default, alias = "localDir", alias = "local_dir", alias = "localDirectory")]
    pub local_directory: PathBuf,
    /// Destination bucket
    #[serde(default, alias = "bucketName")]
    pub bucket_name: String,
    /// Virtual folder under which objects are placed
    #[serde(default, alias = "bucketPrefix")]
    pub bucket_prefix: String,
    /// Base ACL for uploads
    #[serde(default)]
    pub acl: CannedAcl,
    /// Descend into symlinked directories
    #[serde(default, alias = "followSymlinks")]
    pub follow_symlinks: bool,
    /// Delete remote objects with no local counterpart
    #[serde(default = "default_true", alias = "deleteRemoved")]
    pub delete_removed: bool,
    /// Run during the artifact phase instead of after deploy
    #[serde(default)]
    pub artifact: bool,
    /// Ordered per-object parameter rules
    #[serde(default, alias = "params", alias = "paramRules")]
    pub param_rules: Vec<ParamRule>,
}

impl SyncTarget {
    /// Create a target with defaults for everything but the two required fields
    pub fn new(local_directory: impl Into<PathBuf>, bucket_name: impl Into<String>) -> Self {
        Self {
            local_directory: local_directory.into(),
            bucket_name: bucket_name.into(),
            bucket_prefix: String::new(),
            acl: CannedAcl::default(),
            follow_symlinks: false,
            delete_removed: true,
            artifact: false,
            param_rules: Vec::new(),
        }
    }

    /// Set the bucket prefix (normalized to end with `/`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bucket_prefix = normalize_prefix(&prefix.into());
        self
    }

    /// Set the base ACL
    pub fn with_acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }

    /// Enable or disable deletion of remote-only objects
    pub fn delete_removed(mut self, enable: bool) -> Self {
        self.delete_removed = enable;
        self
    }

    /// Enable or disable following symlinks
    pub fn follow_symlinks(mut self, enable: bool) -> Self {
        self.follow_symlinks = enable;
        self
    }

    /// Mark the target as an artifact-phase target
    pub fn artifact(mut self, enable: bool) -> Self {
        self.artifact = enable;
        self
    }

    /// Append a parameter rule
    pub fn with_rule(mut self, rule: ParamRule) -> Self {
        self.param_rules.push(rule);
        self
    }

    /// Check required fields before any I/O
    pub fn validate(&self) -> Result<()> {
        if self.bucket_name.trim().is_empty() {
            return Err(SyncError::config("bucket_name is required"));
        }
        if self.local_directory.as_os_str().is_empty() {
            return Err(SyncError::config(format!(
                "local_directory is required for bucket '{}'",
                self.bucket_name
            )));
        }
        Ok(())
    }

    /// Prefix exactly as it is prepended to object keys
    pub fn key_prefix(&self) -> String {
        normalize_prefix(&self.bucket_prefix)
    }

    /// Full object key for a `/`-separated relative path
    pub fn object_key(&self, relative_path: &str) -> String {
        format!("{}{}", self.key_prefix(), relative_path)
    }

    /// Identity used to serialize operations on the same prefix
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.bucket_name, self.key_prefix())
    }

    /// Human-readable destination
    pub fn destination(&self) -> String {
        format!("s3://{}/{}", self.bucket_name, self.key_prefix())
    }
}

/// Normalize a bucket prefix: no leading `/`, a single trailing `/` unless empty
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Engine tuning and storage client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineSettings {
    /// Maximum concurrent transfer units
    #[serde(alias = "maxAsyncS3")]
    pub concurrency: usize,
    /// Retries per unit for transient failures
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// AWS region (falls back to the default provider chain)
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
    /// Force path-style addressing
    pub force_path_style: bool,
    /// Per-call timeout for storage operations
    pub operation_timeout_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 200,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            operation_timeout_secs: None,
        }
    }
}

impl EngineSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::config("concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Base retry delay
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Per-call timeout, if configured
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

/// Parsed config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Engine settings
    #[serde(default)]
    pub settings: EngineSettings,
    /// Sync targets in declaration order
    #[serde(default, alias = "s3Sync")]
    pub targets: Vec<SyncTarget>,
}

impl ConfigFile {
    /// Load, resolve and validate a config file
    ///
    /// Relative local directories resolve against the directory holding
    /// the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_toml(&text)?
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve(base)
    }

    /// Parse TOML text without resolving paths
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SyncError::config(format!("invalid TOML: {}", e)))
    }

    /// Parse JSON text without resolving paths
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::config(format!("invalid JSON: {}", e)))
    }

    /// Apply defaults that depend on location, normalize and validate
    pub fn resolve(mut self, base: &Path) -> Result<Self> {
        self.settings.validate()?;
        for target in &mut self.targets {
            target.validate()?;
            if target.local_directory.is_relative() {
                target.local_directory = base.join(&target.local_directory);
            }
            target.bucket_prefix = normalize_prefix(&target.bucket_prefix);
        }
        Ok(self)
    }
}
