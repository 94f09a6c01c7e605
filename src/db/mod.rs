mod schema;
pub mod records;
pub mod sqlite;

pub use records::{
    ConflictInfo, ConflictKind, DuplicateGroup, FileRecord, FingerprintRecord, GroupMember,
    GroupTier, ManualOverride, MemberRole, NewFileRecord, OverrideScope,
};
pub use schema::{MIGRATIONS, SCHEMA};
pub use sqlite::{Database, NewConflict, PendingGroup, StoredConflict};
