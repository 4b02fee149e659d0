use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRecord {
    pub principal_id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Authorized,
    Unauthorized,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create acl database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
}

fn sql_error(source: rusqlite::Error) -> AclError {
    AclError::Sql { source }
}

/// Durable record of which principals are authorized or banned. Membership
/// checks read the database directly; there is no in-memory mirror to keep
/// consistent across concurrent admission decisions.
pub struct AclStore {
    db_path: PathBuf,
}

impl AclStore {
    pub fn open(db_path: &Path) -> Result<Self, AclError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| AclError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };

        // Ensure open is valid now to fail fast.
        let _ = store.connect()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, AclError> {
        Connection::open(&self.db_path).map_err(|source| AclError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    pub fn ensure_schema(&self) -> Result<(), AclError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS principals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    principal_id INTEGER NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    banned INTEGER NOT NULL DEFAULT 0
                );
                ",
            )
            .map_err(sql_error)
    }

    /// Drops and recreates the table, for forced fresh initialization.
    pub fn reset(&self) -> Result<(), AclError> {
        let connection = self.connect()?;
        connection
            .execute_batch("DROP TABLE IF EXISTS principals;")
            .map_err(sql_error)?;
        self.ensure_schema()
    }

    /// Inserts a membership decision. A second insert for the same principal
    /// id hits the uniqueness constraint and reports `Duplicate` instead of
    /// failing, so replayed admission tokens stay idempotent.
    pub fn persist(
        &self,
        principal: &PrincipalRecord,
        banned: bool,
    ) -> Result<PersistOutcome, AclError> {
        let connection = self.connect()?;
        let inserted = connection.execute(
            "INSERT INTO principals (principal_id, display_name, banned) VALUES (?1, ?2, ?3)",
            params![
                principal.principal_id,
                principal.display_name,
                i64::from(banned)
            ],
        );
        match inserted {
            Ok(_) => Ok(PersistOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(PersistOutcome::Duplicate)
            }
            Err(source) => Err(sql_error(source)),
        }
    }

    pub fn membership(&self, principal_id: i64) -> Result<Membership, AclError> {
        let connection = self.connect()?;
        let banned: Option<i64> = connection
            .query_row(
                "SELECT banned FROM principals WHERE principal_id = ?1",
                params![principal_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        Ok(match banned {
            None => Membership::Unauthorized,
            Some(0) => Membership::Authorized,
            Some(_) => Membership::Banned,
        })
    }

    /// Full scan partitioned by the banned flag.
    pub fn load(&self) -> Result<(Vec<PrincipalRecord>, Vec<PrincipalRecord>), AclError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT principal_id, display_name, banned FROM principals ORDER BY principal_id")
            .map_err(sql_error)?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    PrincipalRecord {
                        principal_id: row.get(0)?,
                        display_name: row.get(1)?,
                    },
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(sql_error)?;

        let mut authorized = Vec::new();
        let mut banned = Vec::new();
        for row in rows {
            let (record, flag) = row.map_err(sql_error)?;
            if flag == 0 {
                authorized.push(record);
            } else {
                banned.push(record);
            }
        }
        Ok((authorized, banned))
    }

    /// Seeds statically configured principal ids as authorized. Existing rows
    /// are left untouched, so seeding is safe on every startup.
    pub fn seed(&self, principal_ids: &[i64]) -> Result<usize, AclError> {
        let mut inserted = 0;
        for principal_id in principal_ids {
            let record = PrincipalRecord {
                principal_id: *principal_id,
                display_name: "preauthorized".to_string(),
            };
            if self.persist(&record, false)? == PersistOutcome::Inserted {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
