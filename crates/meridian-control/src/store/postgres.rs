//! PostgreSQL platform store implementation.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    App, AppId, Config, ConfigId, Formation, Image, ProcessScale, Release, ReleaseId,
    ReleaseStatus, Slug, SlugId,
};

use super::PlatformStore;

/// PostgreSQL-backed platform store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(config: &DatabaseConfig) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> EngineResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                repo TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS configs (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id),
                version BIGINT NOT NULL,
                vars JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (app_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slugs (
                id TEXT PRIMARY KEY,
                image TEXT NOT NULL,
                process_types JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id),
                version BIGINT NOT NULL,
                config_id TEXT NOT NULL REFERENCES configs(id),
                slug_id TEXT NOT NULL REFERENCES slugs(id),
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (app_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS formations (
                app_id TEXT NOT NULL REFERENCES apps(id),
                process_type TEXT NOT NULL,
                quantity BIGINT NOT NULL,
                size TEXT NOT NULL,
                PRIMARY KEY (app_id, process_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_releases_app_version
            ON releases (app_id, version DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_configs_app_version
            ON configs (app_id, version DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_app(row: &sqlx::postgres::PgRow) -> App {
        App {
            id: AppId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            repo: row.get("repo"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_config(row: &sqlx::postgres::PgRow) -> EngineResult<Config> {
        let vars_json: serde_json::Value = row.get("vars");
        let vars = serde_json::from_value(vars_json)
            .map_err(|e| EngineError::Serialisation(format!("failed to deserialise vars: {e}")))?;

        Ok(Config {
            id: ConfigId::new(row.get::<String, _>("id")),
            app_id: AppId::new(row.get::<String, _>("app_id")),
            version: row.get("version"),
            vars,
            created_at: row.get("created_at"),
        })
    }

    fn row_to_slug(row: &sqlx::postgres::PgRow) -> EngineResult<Slug> {
        let image_str: String = row.get("image");
        let image: Image = image_str
            .parse()
            .map_err(|e| EngineError::Serialisation(format!("failed to parse image: {e}")))?;

        let process_types_json: serde_json::Value = row.get("process_types");
        let process_types = serde_json::from_value(process_types_json).map_err(|e| {
            EngineError::Serialisation(format!("failed to deserialise process types: {e}"))
        })?;

        Ok(Slug {
            id: SlugId::new(row.get::<String, _>("id")),
            image,
            process_types,
            created_at: row.get("created_at"),
        })
    }

    fn row_to_release(row: &sqlx::postgres::PgRow) -> EngineResult<Release> {
        let status_str: String = row.get("status");
        let status: ReleaseStatus = status_str.parse().map_err(|e| {
            EngineError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
        })?;

        Ok(Release {
            id: ReleaseId::new(row.get::<String, _>("id")),
            app_id: AppId::new(row.get::<String, _>("app_id")),
            version: row.get("version"),
            config_id: ConfigId::new(row.get::<String, _>("config_id")),
            slug_id: SlugId::new(row.get::<String, _>("slug_id")),
            description: row.get("description"),
            status,
            created_at: row.get("created_at"),
        })
    }
}

/// Map a unique-constraint violation to [`EngineError::Conflict`].
fn map_insert_error(err: sqlx::Error, what: &str) -> EngineError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            EngineError::conflict(format!("{what}: {}", db.message()))
        }
        _ => EngineError::Database(err),
    }
}

#[async_trait]
impl PlatformStore for PostgresStore {
    async fn insert_app(&self, app: &App) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO apps (id, name, repo, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(app.id.as_str())
        .bind(&app.name)
        .bind(&app.repo)
        .bind(app.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "app name already taken"))?;

        Ok(())
    }

    async fn app_by_name(&self, name: &str) -> EngineResult<Option<App>> {
        let row = sqlx::query("SELECT id, name, repo, created_at FROM apps WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_app))
    }

    async fn app_by_repo(&self, repo: &str) -> EngineResult<Option<App>> {
        let row = sqlx::query("SELECT id, name, repo, created_at FROM apps WHERE repo = $1")
            .bind(repo)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_app))
    }

    async fn update_app_repo(&self, id: &AppId, repo: &str) -> EngineResult<()> {
        let result = sqlx::query("UPDATE apps SET repo = $1 WHERE id = $2")
            .bind(repo)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::AppNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn insert_config(&self, config: &Config) -> EngineResult<()> {
        let vars_json = serde_json::to_value(&config.vars)
            .map_err(|e| EngineError::Serialisation(format!("failed to serialise vars: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO configs (id, app_id, version, vars, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(config.id.as_str())
        .bind(config.app_id.as_str())
        .bind(config.version)
        .bind(&vars_json)
        .bind(config.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "config version already exists"))?;

        Ok(())
    }

    async fn current_config(&self, app: &AppId) -> EngineResult<Option<Config>> {
        let row = sqlx::query(
            r#"
            SELECT id, app_id, version, vars, created_at
            FROM configs
            WHERE app_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(app.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_config(&r)?)),
            None => Ok(None),
        }
    }

    async fn config_by_id(&self, id: &ConfigId) -> EngineResult<Option<Config>> {
        let row = sqlx::query(
            "SELECT id, app_id, version, vars, created_at FROM configs WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_config(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert_slug(&self, slug: &Slug) -> EngineResult<()> {
        let process_types_json = serde_json::to_value(&slug.process_types).map_err(|e| {
            EngineError::Serialisation(format!("failed to serialise process types: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO slugs (id, image, process_types, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(slug.id.as_str())
        .bind(slug.image.to_string())
        .bind(&process_types_json)
        .bind(slug.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn slug_by_id(&self, id: &SlugId) -> EngineResult<Option<Slug>> {
        let row =
            sqlx::query("SELECT id, image, process_types, created_at FROM slugs WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_slug(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert_release(&self, release: &Release) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO releases (
                id, app_id, version, config_id, slug_id, description, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(release.id.as_str())
        .bind(release.app_id.as_str())
        .bind(release.version)
        .bind(release.config_id.as_str())
        .bind(release.slug_id.as_str())
        .bind(&release.description)
        .bind(release.status.as_str())
        .bind(release.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "release version already exists"))?;

        Ok(())
    }

    async fn release_by_version(
        &self,
        app: &AppId,
        version: i64,
    ) -> EngineResult<Option<Release>> {
        let row = sqlx::query(
            r#"
            SELECT id, app_id, version, config_id, slug_id, description, status, created_at
            FROM releases
            WHERE app_id = $1 AND version = $2
            "#,
        )
        .bind(app.as_str())
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_release(&r)?)),
            None => Ok(None),
        }
    }

    async fn releases(&self, app: &AppId) -> EngineResult<Vec<Release>> {
        let rows = sqlx::query(
            r#"
            SELECT id, app_id, version, config_id, slug_id, description, status, created_at
            FROM releases
            WHERE app_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(app.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_release).collect()
    }

    async fn max_release_version(&self, app: &AppId) -> EngineResult<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM releases WHERE app_id = $1")
            .bind(app.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get(0))
    }

    async fn update_release_status(
        &self,
        id: &ReleaseId,
        status: ReleaseStatus,
    ) -> EngineResult<()> {
        let result = sqlx::query("UPDATE releases SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::internal(format!(
                "release {id} missing during status update"
            )));
        }

        Ok(())
    }

    async fn formation(&self, app: &AppId) -> EngineResult<Formation> {
        let rows =
            sqlx::query("SELECT process_type, quantity, size FROM formations WHERE app_id = $1")
                .bind(app.as_str())
                .fetch_all(&self.pool)
                .await?;

        let mut formation = Formation::new();
        for row in &rows {
            let process_type: String = row.get("process_type");
            let quantity: i64 = row.get("quantity");
            let size: String = row.get("size");

            let count = u32::try_from(quantity).map_err(|_| {
                EngineError::Serialisation(format!("formation quantity out of range: {quantity}"))
            })?;

            formation.set(process_type, ProcessScale { count, size });
        }

        Ok(formation)
    }

    async fn save_formation(&self, app: &AppId, formation: &Formation) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM formations WHERE app_id = $1")
            .bind(app.as_str())
            .execute(&mut *tx)
            .await?;

        for (process_type, scale) in formation.iter() {
            sqlx::query(
                r#"
                INSERT INTO formations (app_id, process_type, quantity, size)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(app.as_str())
            .bind(process_type)
            .bind(i64::from(scale.count))
            .bind(&scale.size)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
