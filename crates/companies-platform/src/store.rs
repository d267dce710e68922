use async_trait::async_trait;
use companies_core::{CompanyFields, CompanyRecord, RecordStore, StoreError};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::warn;
use uuid::Uuid;

/// [`RecordStore`] over the `companies` table. The table's unique index on
/// `name` is what serializes concurrent creates.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn write_error(operation: &'static str, name: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateName(name.to_string())
        }
        _ => StoreError::backend(operation, err),
    }
}

fn company_from_row(row: &PgRow) -> Result<CompanyRecord, sqlx::Error> {
    Ok(CompanyRecord {
        id: row.try_get("id")?,
        fields: CompanyFields {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            employees_count: row.try_get("employees_count")?,
            is_registered: row.try_get("is_registered")?,
            company_type: row.try_get("company_type")?,
        },
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create(&self, fields: CompanyFields) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO companies (
                id, name, description, employees_count, is_registered, company_type
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.employees_count)
        .bind(fields.is_registered)
        .bind(fields.company_type)
        .execute(&self.pool)
        .await
        .map_err(|err| write_error("create company", &fields.name, err))?;

        Ok(id)
    }

    async fn update(&self, id: Uuid, fields: CompanyFields) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET name = $2,
                description = $3,
                employees_count = $4,
                is_registered = $5,
                company_type = $6,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.employees_count)
        .bind(fields.is_registered)
        .bind(fields.company_type)
        .execute(&self.pool)
        .await
        .map_err(|err| write_error("update company", &fields.name, err))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("delete company", err))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<CompanyRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, employees_count, is_registered, company_type
            FROM companies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::backend("get company", err))?
        .ok_or(StoreError::NotFound(id))?;

        company_from_row(&row).map_err(|err| StoreError::backend("decode company", err))
    }

    async fn exists(&self, name: &str) -> bool {
        let found =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM companies WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await;

        match found {
            Ok(found) => found,
            Err(err) => {
                warn!("name lookup for {name:?} failed, treating as absent: {err}");
                false
            }
        }
    }
}
