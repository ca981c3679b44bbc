//! Configuration options.
//!
//! The tracking core is configured once per inspection instance. A [StreamConfig] is shared
//! read-only by every session through an `Arc`, together with the
//! [Normalizer](crate::tcp::normalizer::Normalizer) built from it. Applications will typically
//! load it from a TOML file whose path is passed on the command line:
//!
//! ```toml
//! policy = "linux"
//! require_3whs = true
//! overlap_limit = 10
//!
//! [small_segments]
//!     count = 10
//!     maximum_size = 32
//!
//! [normalizer]
//!     mode = "inline"
//!     trim_win = true
//! ```

use crate::tcp::normalizer::{OverlapRule, ReassemblyPolicy};

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StreamConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read stream config {}", path.display()))?;
    let config: StreamConfig = toml::from_str(&config_str)
        .with_context(|| format!("invalid stream config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Returns the default configuration.
///
/// Equivalent to an empty configuration file: BSD reassembly, midstream pickup allowed, PAWS
/// enabled, passive normalization.
pub fn default_config() -> StreamConfig {
    StreamConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Stream tracking options.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StreamConfig {
    /// Target-based reassembly policy. Defaults to `"bsd"`.
    #[serde(default = "default_policy")]
    pub policy: ReassemblyPolicy,

    /// Overrides the overlap rule implied by `policy`. Defaults to `None`.
    #[serde(default = "default_overlap_rule")]
    pub overlap_rule: Option<OverlapRule>,

    /// Only track sessions that start with a three-way handshake. When `false`, sessions are
    /// picked up midstream from a SYN/ACK, an ACK or a data segment. Defaults to `false`.
    #[serde(default = "default_require_3whs")]
    pub require_3whs: bool,

    /// Enable protection against wrapped sequence numbers (RFC 7323 PAWS). Defaults to `true`.
    #[serde(default = "default_paws")]
    pub paws: bool,

    /// A recorded timestamp older than this (in seconds) no longer rejects segments. Defaults to
    /// `2_073_600` (24 days).
    #[serde(default = "default_paws_idle_limit_secs")]
    pub paws_idle_limit_secs: u64,

    /// A session can be inactive for up to this amount of time (in seconds) before
    /// [is_idle](crate::tcp::session::StreamSession::is_idle) reports it. Defaults to `180`.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum scaled window a receiver may advertise. `0` disables the check. Defaults to `0`.
    #[serde(default = "default_max_window")]
    pub max_window: u32,

    /// A handshake-completing ACK advertising a window at or below this value is a window slam.
    /// Defaults to `4`.
    #[serde(default = "default_window_slam_max")]
    pub window_slam_max: u32,

    /// Maximum number of times a receiver may shrink its window to zero and reopen it. `0`
    /// disables the check. Defaults to `0`.
    #[serde(default = "default_max_window_reopens")]
    pub max_window_reopens: u32,

    /// Maximum number of overlapping segments per direction before `excessive-overlaps` is
    /// raised. `0` disables the check. Defaults to `0`.
    #[serde(default = "default_overlap_limit")]
    pub overlap_limit: u32,

    /// Maximum number of payload bytes queued per direction. `0` is unlimited. Defaults to
    /// `4_194_304`.
    #[serde(default = "default_max_queued_bytes")]
    pub max_queued_bytes: usize,

    /// Maximum number of segments queued per direction. `0` is unlimited. Defaults to `3072`.
    #[serde(default = "default_max_queued_segs")]
    pub max_queued_segs: usize,

    /// What to do when a queue limit is reached. Defaults to `"evict"`.
    #[serde(default = "default_queue_limit_action")]
    pub queue_limit_action: QueueLimitAction,

    /// When contiguous data is handed to inspection. Defaults to `"on_data"`.
    #[serde(default = "default_flush_policy")]
    pub flush_policy: FlushPolicy,

    /// Alert when the link-layer address of either endpoint changes mid-session. Defaults to
    /// `false`.
    #[serde(default = "default_check_session_hijacking")]
    pub check_session_hijacking: bool,

    /// Small segment detection.
    #[serde(default)]
    pub small_segments: SmallSegmentConfig,

    /// Normalization options.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            policy: default_policy(),
            overlap_rule: default_overlap_rule(),
            require_3whs: default_require_3whs(),
            paws: default_paws(),
            paws_idle_limit_secs: default_paws_idle_limit_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_window: default_max_window(),
            window_slam_max: default_window_slam_max(),
            max_window_reopens: default_max_window_reopens(),
            overlap_limit: default_overlap_limit(),
            max_queued_bytes: default_max_queued_bytes(),
            max_queued_segs: default_max_queued_segs(),
            queue_limit_action: default_queue_limit_action(),
            flush_policy: default_flush_policy(),
            check_session_hijacking: default_check_session_hijacking(),
            small_segments: SmallSegmentConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Largest window representable with the maximum window scale of 14.
    pub const MAX_SCALED_WINDOW: u32 = 1_073_725_440;

    /// Checks option ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_window > Self::MAX_SCALED_WINDOW {
            bail!(
                "max_window {} exceeds the largest scaled window {}",
                self.max_window,
                Self::MAX_SCALED_WINDOW
            );
        }
        if self.paws_idle_limit_secs == 0 {
            bail!("paws_idle_limit_secs must be positive");
        }
        if self.small_segments.count > 0 && self.small_segments.maximum_size == 0 {
            bail!("small_segments.maximum_size must be set when small_segments.count is");
        }
        if self.small_segments.maximum_size > 2048 {
            bail!(
                "small_segments.maximum_size {} exceeds 2048",
                self.small_segments.maximum_size
            );
        }
        Ok(())
    }

    /// Overlap rule in effect: the configured override, or the one implied by the policy.
    pub fn effective_overlap_rule(&self) -> OverlapRule {
        self.overlap_rule
            .unwrap_or_else(|| self.policy.overlap_rule())
    }
}

fn default_policy() -> ReassemblyPolicy {
    ReassemblyPolicy::Bsd
}

fn default_overlap_rule() -> Option<OverlapRule> {
    None
}

fn default_require_3whs() -> bool {
    false
}

fn default_paws() -> bool {
    true
}

fn default_paws_idle_limit_secs() -> u64 {
    24 * 24 * 60 * 60
}

fn default_idle_timeout_secs() -> u64 {
    180
}

fn default_max_window() -> u32 {
    0
}

fn default_window_slam_max() -> u32 {
    4
}

fn default_max_window_reopens() -> u32 {
    0
}

fn default_overlap_limit() -> u32 {
    0
}

fn default_max_queued_bytes() -> usize {
    4_194_304
}

fn default_max_queued_segs() -> usize {
    3072
}

fn default_queue_limit_action() -> QueueLimitAction {
    QueueLimitAction::Evict
}

fn default_flush_policy() -> FlushPolicy {
    FlushPolicy::OnData
}

fn default_check_session_hijacking() -> bool {
    false
}

/// Response to a reassembly queue limit.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueueLimitAction {
    /// Flush everything queued, skipping holes, and keep going.
    Evict,
    /// Stop queueing data for the direction and mark the packet bad.
    Terminate,
}

/// When queued data is handed to inspection.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush contiguous data as soon as it is queued.
    OnData,
    /// Flush only data the receiver acknowledged.
    OnAck,
}

/* --------------------------------------------------------------------------------- */

/// Small segment detection options.
///
/// ## Example
/// ```toml
/// [small_segments]
///     count = 10
///     maximum_size = 32
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SmallSegmentConfig {
    /// Number of consecutive small segments that raises `small-segments`. `0` disables the
    /// check. Defaults to `0`.
    #[serde(default)]
    pub count: u32,

    /// Payloads at or below this size (in bytes) are small. Defaults to `0`.
    #[serde(default)]
    pub maximum_size: u32,
}

/* --------------------------------------------------------------------------------- */

/// Normalization options.
///
/// In `passive` mode the core only reports what it would have done. In `inline` mode rejected
/// segments are additionally marked for drop and normalization requests are meant to be applied
/// by the packet-disposition stage.
///
/// ## Example
/// ```toml
/// [normalizer]
///     mode = "inline"
///     trim_syn = true
///     trim_rst = true
///     urgent = "clear"
///     options = "strip"
///     ecn = "stream"
///     block = true
/// ```
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NormalizerConfig {
    /// Defaults to `"passive"`.
    #[serde(default = "default_norm_mode")]
    pub mode: NormMode,

    /// Trim payload carried on SYN segments. Defaults to `false`.
    #[serde(default)]
    pub trim_syn: bool,

    /// Trim payload carried on RST segments. Defaults to `false`.
    #[serde(default)]
    pub trim_rst: bool,

    /// Trim payload beyond the receive window. Defaults to `false`.
    #[serde(default)]
    pub trim_win: bool,

    /// Trim payload beyond the negotiated MSS. Defaults to `false`.
    #[serde(default)]
    pub trim_mss: bool,

    /// Handling of inconsistent urgent data. Defaults to `"pass"`.
    #[serde(default = "default_urgent_action")]
    pub urgent: UrgentAction,

    /// Handling of invalid option combinations. Defaults to `"pass"`.
    #[serde(default = "default_options_action")]
    pub options: OptionsAction,

    /// ECN normalization. Defaults to `"off"`.
    #[serde(default = "default_ecn_mode")]
    pub ecn: EcnMode,

    /// Block packets marked bad by the tracker. Inline mode only. Defaults to `false`.
    #[serde(default)]
    pub block: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            mode: default_norm_mode(),
            trim_syn: false,
            trim_rst: false,
            trim_win: false,
            trim_mss: false,
            urgent: default_urgent_action(),
            options: default_options_action(),
            ecn: default_ecn_mode(),
            block: false,
        }
    }
}

fn default_norm_mode() -> NormMode {
    NormMode::Passive
}

fn default_urgent_action() -> UrgentAction {
    UrgentAction::Pass
}

fn default_options_action() -> OptionsAction {
    OptionsAction::Pass
}

fn default_ecn_mode() -> EcnMode {
    EcnMode::Off
}

#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NormMode {
    Passive,
    Inline,
}

#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UrgentAction {
    Pass,
    /// Request the URG flag and urgent pointer be cleared.
    Clear,
    /// Drop the segment.
    Drop,
}

#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OptionsAction {
    Pass,
    /// Request invalid options be replaced with NOPs.
    Strip,
    /// Drop the segment.
    Drop,
}

#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EcnMode {
    Off,
    /// Clear ECN flags on every packet that carries them.
    Packet,
    /// Clear ECN flags for the whole session when ECN was not negotiated on the handshake.
    Stream,
}
