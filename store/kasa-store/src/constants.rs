//! TigerStyle Constants
//!
//! All limits use big-endian naming: CATEGORY_SPECIFICS_UNIT_LIMIT
//! Example: PROBE_REMOTE_TIMEOUT_MS_DEFAULT (not DEFAULT_REMOTE_TIMEOUT)
//!
//! Every constant includes units in the name:
//! - _BYTES_MAX/MIN for size limits
//! - _MS_DEFAULT for time durations
//! - _COUNT_MAX for quantity limits

// =============================================================================
// Backend Probing
// =============================================================================

/// Time allowed for probing (and then connecting to) the remote database
pub const PROBE_REMOTE_TIMEOUT_MS_DEFAULT: u64 = 3_000;

/// Time allowed for probing (and then connecting to) the local database
pub const PROBE_LOCAL_TIMEOUT_MS_DEFAULT: u64 = 2_000;

/// Upper bound for any configured probe timeout
pub const PROBE_TIMEOUT_MS_MAX: u64 = 30_000;

/// Conventional address of the database engine on the loopback interface
pub const LOCAL_DATABASE_URI_DEFAULT: &str = "mongodb://127.0.0.1:27017";

/// Database name used on both the remote and local engine
pub const DATABASE_NAME_DEFAULT: &str = "kasa";

/// Environment variable holding the remote connection string
pub const REMOTE_DATABASE_URI_ENV: &str = "MONGODB_URI";

// =============================================================================
// Embedded File Store
// =============================================================================

/// Conventional directory for the embedded store's collection files
pub const DATA_DIR_DEFAULT: &str = "data";

/// Extension of a collection file
pub const COLLECTION_FILE_EXTENSION: &str = "json";

/// Extension of the scratch file written before the atomic rename
pub const COLLECTION_TEMP_FILE_EXTENSION: &str = "json.tmp";

/// Maximum length of a collection name
pub const COLLECTION_NAME_BYTES_MAX: usize = 64;

// =============================================================================
// Documents
// =============================================================================

/// Engine-native identifier field
pub const ENGINE_ID_FIELD: &str = "_id";

/// Application identifier field
pub const APP_ID_FIELD: &str = "id";

/// Creation timestamp field
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Last update timestamp field
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Random hex characters appended to a generated identifier
pub const ID_SUFFIX_CHARS_COUNT: usize = 8;

/// Maximum length of a regex pattern accepted in a filter
pub const FILTER_PATTERN_BYTES_MAX: usize = 1_024;

/// Maximum nesting depth of a filter
pub const FILTER_DEPTH_MAX: usize = 16;

// =============================================================================
// Domain Accessors
// =============================================================================

/// Maximum page size for paginated listings
pub const PAGE_LIMIT_MAX: usize = 1_000;

/// Default number of activities returned for a family
pub const FAMILY_ACTIVITIES_LIMIT_DEFAULT: usize = 50;
