use crate::config::DatabaseConfig;
use crate::pipeline::dataset::LayerName;
use crate::store::{
    AttributeValue, FeatureRow, FeatureTable, GeometryText, SpatialStore, StoreError, SRID,
};
use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder};

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = 65_000;
const MAX_ROWS_PER_INSERT: usize = 1_000;

/// PostGIS-backed [`SpatialStore`].
#[derive(Clone)]
pub struct PostgisStore {
    pool: PgPool,
    schema: String,
}

impl PostgisStore {
    /// Builds a lazily connecting pool; the first query opens the connection.
    ///
    /// Every connection gets a `statement_timeout` so a stuck import cannot
    /// hold a request forever.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.dbname)
            .username(&config.user)
            .password(&config.password)
            .options([(
                "statement_timeout",
                format!("{}s", config.statement_timeout_secs),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options);

        info!(
            "PostGIS pool configured for {}:{}/{} (user {})",
            config.host, config.port, config.dbname, config.user
        );

        Self::with_pool(pool, config.schema.clone())
    }

    pub fn with_pool(pool: PgPool, schema: String) -> Self {
        Self { pool, schema }
    }

    fn qualified(&self, layer: &LayerName) -> String {
        format!("\"{}\".{}", self.schema, layer.quoted())
    }

    fn create_table_sql(&self, layer: &LayerName, table: &FeatureTable) -> String {
        let mut ddl = format!(
            "CREATE TABLE {} (gid SERIAL PRIMARY KEY, geom geometry(Geometry, {SRID})",
            self.qualified(layer)
        );
        for column in &table.columns {
            ddl.push_str(&format!(", \"{}\" {}", column.name, column.kind.sql_type()));
        }
        ddl.push(')');
        ddl
    }

    fn insert_prefix(&self, layer: &LayerName, table: &FeatureTable) -> String {
        let mut prefix = format!("INSERT INTO {} (geom", self.qualified(layer));
        for column in &table.columns {
            prefix.push_str(&format!(", \"{}\"", column.name));
        }
        prefix.push_str(") ");
        prefix
    }
}

fn rows_per_insert(columns: usize) -> usize {
    (MAX_BIND_PARAMS / (columns + 1)).clamp(1, MAX_ROWS_PER_INSERT)
}

fn push_row<'a>(
    mut values: sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>,
    row: &'a FeatureRow,
) {
    match &row.geometry {
        GeometryText::Wkt(wkt) => {
            values.push("ST_GeomFromText(");
            values.push_bind_unseparated(wkt.as_str());
        }
        GeometryText::GeoJson(json) => {
            values.push("ST_SetSRID(ST_GeomFromGeoJSON(");
            values.push_bind_unseparated(json.as_str());
            values.push_unseparated(")");
        }
    }
    values.push_unseparated(format!(", {SRID})"));

    for value in &row.values {
        match value {
            // Untyped NULL takes the column type.
            AttributeValue::Null => {
                values.push("NULL");
            }
            AttributeValue::Text(v) => {
                values.push_bind(v.as_str());
            }
            AttributeValue::Integer(v) => {
                values.push_bind(*v);
            }
            AttributeValue::Double(v) => {
                values.push_bind(*v);
            }
            AttributeValue::Boolean(v) => {
                values.push_bind(*v);
            }
        }
    }
}

#[async_trait]
impl SpatialStore for PostgisStore {
    async fn replace_table(
        &self,
        layer: &LayerName,
        table: &FeatureTable,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.qualified(layer)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&self.create_table_sql(layer, table))
            .execute(&mut *tx)
            .await?;

        let prefix = self.insert_prefix(layer, table);
        let mut written = 0;
        for chunk in table.rows.chunks(rows_per_insert(table.columns.len())) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(prefix.as_str());
            builder.push_values(chunk, |values, row| push_row(values, row));
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        sqlx::query(&format!(
            "CREATE INDEX ON {} USING GIST (geom)",
            self.qualified(layer)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Replaced table {} with {} rows", self.qualified(layer), written);
        Ok(written)
    }

    async fn drop_table(&self, layer: &LayerName) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let existed: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(self.qualified(layer))
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.qualified(layer)))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(existed)
    }
}
