use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgstay_core::{
    ArchivedTenant, Identity, KycDetails, Payment, Room, StoreError, StoreResult, TenancyStore,
    TenancyTx, TenantProfile, TenantSummary,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = r#"
    id, identity_id, property_id, room_id, name, phone, status, details,
    monthly_rent, deposit, balance, admission_date, last_billing_date,
    next_billing_date, otp, is_verified, last_balance_check, created_at
"#;

#[derive(Clone)]
pub struct PgTenancyStore {
    pool: PgPool,
}

impl PgTenancyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgTenancyTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TenancyStore for PgTenancyStore {
    type Tx = PgTenancyTx;

    async fn begin(&self) -> StoreResult<PgTenancyTx> {
        let tx = self.pool.begin().await.map_err(store_err)?;
        Ok(PgTenancyTx { tx })
    }

    async fn profile(&self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM tenant_profiles WHERE identity_id = $1"
        ))
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn due_for_billing(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT identity_id
            FROM tenant_profiles
            WHERE status = 'active'
              AND next_billing_date <= $1
            ORDER BY next_billing_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| row.try_get("identity_id").map_err(store_err))
            .collect()
    }

    async fn payments(&self) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, property_id, amount, payment_type, method, paid_at
            FROM payments
            ORDER BY paid_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn tenant_name(&self, identity_id: Uuid) -> StoreResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(
                (SELECT name FROM tenant_profiles WHERE identity_id = $1),
                (SELECT name FROM archived_tenants
                 WHERE original_identity_id = $1
                 ORDER BY checkout_date DESC
                 LIMIT 1)
            ) AS name
            "#,
        )
        .bind(identity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        row.try_get("name").map_err(store_err)
    }

    async fn tenants_by_property(&self, property_id: Uuid) -> StoreResult<Vec<TenantSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT tp.identity_id, i.name, r.room_no, tp.phone, tp.status
            FROM tenant_profiles tp
            JOIN identities i ON i.id = tp.identity_id
            JOIN rooms r ON r.id = tp.room_id
            WHERE r.property_id = $1
            ORDER BY r.room_no, i.name
            "#,
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn archived_tenants(&self, property_id: Uuid) -> StoreResult<Vec<ArchivedTenant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_identity_id, name, phone, father_name, permanent_address,
                   id_proof_no, property_id, room_id, admission_date, checkout_date
            FROM archived_tenants
            WHERE property_id = $1
            ORDER BY checkout_date DESC
            "#,
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(archive_from_row).collect()
    }
}

#[async_trait]
impl TenancyTx for PgTenancyTx {
    async fn room(&mut self, room_id: Uuid) -> StoreResult<Option<Room>> {
        let row = sqlx::query(
            r#"
            SELECT id, property_id, room_no, capacity, price, deposit
            FROM rooms
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Room {
            id: row.try_get("id").map_err(store_err)?,
            property_id: row.try_get("property_id").map_err(store_err)?,
            room_no: row.try_get("room_no").map_err(store_err)?,
            capacity: row.try_get("capacity").map_err(store_err)?,
            price: row.try_get("price").map_err(store_err)?,
            deposit: row.try_get("deposit").map_err(store_err)?,
        }))
    }

    async fn count_active_in_room(&mut self, room_id: Uuid) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM tenant_profiles WHERE room_id = $1 AND status = 'active'",
        )
        .bind(room_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_err)?;

        row.try_get("active").map_err(store_err)
    }

    async fn insert_identity(&mut self, identity: &Identity) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identities (id, name, phone, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(identity.id)
        .bind(&identity.name)
        .bind(&identity.phone)
        .bind(&identity.role)
        .bind(identity.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn insert_profile(&mut self, profile: &TenantProfile) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO tenant_profiles ({PROFILE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#
        ))
        .bind(profile.id)
        .bind(profile.identity_id)
        .bind(profile.property_id)
        .bind(profile.room_id)
        .bind(&profile.name)
        .bind(&profile.phone)
        .bind(profile.status.as_str())
        .bind(Json(&profile.details))
        .bind(profile.monthly_rent)
        .bind(profile.deposit)
        .bind(profile.balance)
        .bind(profile.admission_date)
        .bind(profile.last_billing_date)
        .bind(profile.next_billing_date)
        .bind(profile.otp.as_deref())
        .bind(profile.is_verified)
        .bind(profile.last_balance_check)
        .bind(profile.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn lock_profile(&mut self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM tenant_profiles WHERE identity_id = $1 FOR UPDATE"
        ))
        .bind(identity_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_err)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn activate_profile(&mut self, identity_id: Uuid, balance: Decimal) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_profiles
            SET status = 'active', is_verified = TRUE, otp = NULL, balance = $2
            WHERE identity_id = $1
            "#,
        )
        .bind(identity_id)
        .bind(balance)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        expect_one_row(result.rows_affected(), identity_id)
    }

    async fn adjust_balance(&mut self, identity_id: Uuid, delta: Decimal) -> StoreResult<Decimal> {
        let row = sqlx::query(
            r#"
            UPDATE tenant_profiles
            SET balance = balance + $2
            WHERE identity_id = $1
            RETURNING balance
            "#,
        )
        .bind(identity_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Err(missing_profile(identity_id));
        };
        row.try_get("balance").map_err(store_err)
    }

    async fn set_billing_dates(
        &mut self,
        identity_id: Uuid,
        last_billing_date: DateTime<Utc>,
        next_billing_date: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_profiles
            SET last_billing_date = $2, next_billing_date = $3
            WHERE identity_id = $1
            "#,
        )
        .bind(identity_id)
        .bind(last_billing_date)
        .bind(next_billing_date)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        expect_one_row(result.rows_affected(), identity_id)
    }

    async fn set_last_balance_check(
        &mut self,
        identity_id: Uuid,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE tenant_profiles SET last_balance_check = $2 WHERE identity_id = $1")
                .bind(identity_id)
                .bind(checked_at)
                .execute(&mut *self.tx)
                .await
                .map_err(store_err)?;

        expect_one_row(result.rows_affected(), identity_id)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, tenant_id, property_id, amount, payment_type, method, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id)
        .bind(payment.tenant_id)
        .bind(payment.property_id)
        .bind(payment.amount)
        .bind(payment.payment_type.as_str())
        .bind(payment.method.as_str())
        .bind(payment.paid_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn claim_webhook_event(
        &mut self,
        event_key: &str,
        identity_id: Uuid,
        received_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_key, identity_id, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_key) DO NOTHING
            "#,
        )
        .bind(event_key)
        .bind(identity_id)
        .bind(received_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_archive(&mut self, archive: &ArchivedTenant) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO archived_tenants (
                id, original_identity_id, name, phone, father_name, permanent_address,
                id_proof_no, property_id, room_id, admission_date, checkout_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(archive.id)
        .bind(archive.original_identity_id)
        .bind(&archive.name)
        .bind(&archive.phone)
        .bind(&archive.father_name)
        .bind(&archive.permanent_address)
        .bind(&archive.id_proof_no)
        .bind(archive.property_id)
        .bind(archive.room_id)
        .bind(archive.admission_date)
        .bind(archive.checkout_date)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn delete_profile(&mut self, identity_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM tenant_profiles WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn delete_identity(&mut self, identity_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(identity_id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await.map_err(store_err)
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or("unknown").to_string();
        return StoreError::UniqueViolation(constraint);
    }
    StoreError::Backend(err.into())
}

fn missing_profile(identity_id: Uuid) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(
        "tenant profile {identity_id} not found"
    ))
}

fn expect_one_row(rows_affected: u64, identity_id: Uuid) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(missing_profile(identity_id));
    }
    Ok(())
}

fn profile_from_row(row: &PgRow) -> StoreResult<TenantProfile> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let details: Json<KycDetails> = row.try_get("details").map_err(store_err)?;

    Ok(TenantProfile {
        id: row.try_get("id").map_err(store_err)?,
        identity_id: row.try_get("identity_id").map_err(store_err)?,
        property_id: row.try_get("property_id").map_err(store_err)?,
        room_id: row.try_get("room_id").map_err(store_err)?,
        name: row.try_get("name").map_err(store_err)?,
        phone: row.try_get("phone").map_err(store_err)?,
        status: status.parse().map_err(anyhow::Error::from)?,
        details: details.0,
        monthly_rent: row.try_get("monthly_rent").map_err(store_err)?,
        deposit: row.try_get("deposit").map_err(store_err)?,
        balance: row.try_get("balance").map_err(store_err)?,
        admission_date: row.try_get("admission_date").map_err(store_err)?,
        last_billing_date: row.try_get("last_billing_date").map_err(store_err)?,
        next_billing_date: row.try_get("next_billing_date").map_err(store_err)?,
        otp: row.try_get("otp").map_err(store_err)?,
        is_verified: row.try_get("is_verified").map_err(store_err)?,
        last_balance_check: row.try_get("last_balance_check").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<Payment> {
    let payment_type: String = row.try_get("payment_type").map_err(store_err)?;
    let method: String = row.try_get("method").map_err(store_err)?;

    Ok(Payment {
        id: row.try_get("id").map_err(store_err)?,
        tenant_id: row.try_get("tenant_id").map_err(store_err)?,
        property_id: row.try_get("property_id").map_err(store_err)?,
        amount: row.try_get("amount").map_err(store_err)?,
        payment_type: payment_type.parse().map_err(anyhow::Error::from)?,
        method: method.parse().map_err(anyhow::Error::from)?,
        paid_at: row.try_get("paid_at").map_err(store_err)?,
    })
}

fn summary_from_row(row: &PgRow) -> StoreResult<TenantSummary> {
    let status: String = row.try_get("status").map_err(store_err)?;

    Ok(TenantSummary {
        identity_id: row.try_get("identity_id").map_err(store_err)?,
        name: row.try_get("name").map_err(store_err)?,
        room_no: row.try_get("room_no").map_err(store_err)?,
        phone: row.try_get("phone").map_err(store_err)?,
        status: status.parse().map_err(anyhow::Error::from)?,
    })
}

fn archive_from_row(row: &PgRow) -> StoreResult<ArchivedTenant> {
    Ok(ArchivedTenant {
        id: row.try_get("id").map_err(store_err)?,
        original_identity_id: row.try_get("original_identity_id").map_err(store_err)?,
        name: row.try_get("name").map_err(store_err)?,
        phone: row.try_get("phone").map_err(store_err)?,
        father_name: row.try_get("father_name").map_err(store_err)?,
        permanent_address: row.try_get("permanent_address").map_err(store_err)?,
        id_proof_no: row.try_get("id_proof_no").map_err(store_err)?,
        property_id: row.try_get("property_id").map_err(store_err)?,
        room_id: row.try_get("room_id").map_err(store_err)?,
        admission_date: row.try_get("admission_date").map_err(store_err)?,
        checkout_date: row.try_get("checkout_date").map_err(store_err)?,
    })
}
