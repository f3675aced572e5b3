//! Postgres-backed record store and catalog source
//!
//! Schema is created lazily on first use. A merge batch is one transaction
//! that starts by locking the user's profile row, so concurrent commits for
//! the same user serialize even across processes.

use super::timeline::plan_generation;
use super::MemoryStore;
use crate::error::OrchestrationError;
use crate::merge::{
    apply_budget_write, apply_event_patch, apply_profile_patch, decide_budget_write,
    decide_milestone_toggle, AppliedChange, BudgetDecision, MergeBatch, MergeReport,
    MilestoneDecision,
};
use crate::models::{
    BudgetPreference, ConversationSummary, Event, EventStatus, MemorySnapshot, Milestone,
    MilestoneSource, Offering, UserId, UserProfile, Vendor,
};
use crate::tools::{CatalogEntry, CatalogSource, RecordChange};
use crate::Result;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user_profile (
      user_id UUID PRIMARY KEY,
      name TEXT,
      region TEXT,
      contact TEXT,
      notes TEXT,
      total_budget BIGINT,
      wedding_date DATE,
      guest_count INTEGER,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS budget_preference (
      budget_id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL REFERENCES user_profile (user_id) ON DELETE CASCADE,
      category TEXT NOT NULL,
      min_amount BIGINT,
      max_amount BIGINT,
      locked BOOLEAN NOT NULL DEFAULT FALSE,
      notes TEXT,
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
      UNIQUE (user_id, category)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event (
      event_id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL REFERENCES user_profile (user_id) ON DELETE CASCADE,
      event_type TEXT NOT NULL,
      title TEXT,
      date DATE,
      time TIME,
      location TEXT,
      budget BIGINT,
      memo TEXT,
      status TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS milestone (
      milestone_id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL REFERENCES user_profile (user_id) ON DELETE CASCADE,
      title TEXT NOT NULL,
      due_date DATE NOT NULL,
      completed BOOLEAN NOT NULL DEFAULT FALSE,
      source TEXT NOT NULL DEFAULT 'user',
      notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversation_summary (
      summary_id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL REFERENCES user_profile (user_id) ON DELETE CASCADE,
      content TEXT NOT NULL,
      latest BOOLEAN NOT NULL DEFAULT FALSE,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_conversation_summary_latest
    ON conversation_summary (user_id) WHERE latest
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vendor (
      vendor_id BIGSERIAL PRIMARY KEY,
      vendor_type TEXT NOT NULL,
      name TEXT NOT NULL,
      region TEXT
    )
    "#,
    "ALTER TABLE vendor ADD COLUMN IF NOT EXISTS min_price BIGINT",
    r#"
    CREATE TABLE IF NOT EXISTS offering (
      offering_id BIGSERIAL PRIMARY KEY,
      vendor_id BIGINT NOT NULL REFERENCES vendor (vendor_id) ON DELETE CASCADE,
      category TEXT NOT NULL,
      package_name TEXT NOT NULL,
      price BIGINT,
      metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    "#,
    // Older catalogs kept free-text vendor notes; they move into offering metadata.
    r#"
    DO $$
    BEGIN
      IF EXISTS (
        SELECT 1 FROM information_schema.columns
        WHERE table_name = 'vendor' AND column_name = 'notes'
      ) THEN
        UPDATE offering o
        SET metadata = o.metadata || jsonb_build_object('vendor_notes', v.notes)
        FROM vendor v
        WHERE o.vendor_id = v.vendor_id AND v.notes IS NOT NULL;
        ALTER TABLE vendor DROP COLUMN notes;
      END IF;
    END $$
    "#,
    "CREATE INDEX IF NOT EXISTS idx_vendor_type ON vendor (vendor_type)",
    "CREATE INDEX IF NOT EXISTS idx_offering_vendor ON offering (vendor_id)",
    "CREATE INDEX IF NOT EXISTS idx_offering_category ON offering (category)",
];

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> OrchestrationError {
    move |e| OrchestrationError::DatabaseError(format!("{}: {}", context, e))
}

pub struct PostgresMemoryStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresMemoryStore {
    /// Pool connects on first use, so a bad URL surfaces on the first turn.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(db_error("Failed to create postgres pool"))?;

        info!("Planner memory backend: postgres");
        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize planner schema"))?;
        Ok(())
    }
}

// =============================
// Row mapping
// =============================

fn profile_from_row(row: &PgRow) -> std::result::Result<UserProfile, sqlx::Error> {
    let guest_count: Option<i32> = row.try_get("guest_count")?;
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        region: row.try_get("region")?,
        contact: row.try_get("contact")?,
        notes: row.try_get("notes")?,
        total_budget: row.try_get("total_budget")?,
        wedding_date: row.try_get("wedding_date")?,
        guest_count: guest_count.map(|g| g.max(0) as u32),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn budget_from_row(row: &PgRow) -> std::result::Result<BudgetPreference, sqlx::Error> {
    Ok(BudgetPreference {
        budget_id: row.try_get("budget_id")?,
        user_id: row.try_get("user_id")?,
        category: row.try_get("category")?,
        min_amount: row.try_get("min_amount")?,
        max_amount: row.try_get("max_amount")?,
        locked: row.try_get("locked")?,
        notes: row.try_get("notes")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> std::result::Result<Event, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Event {
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        event_type: row.try_get("event_type")?,
        title: row.try_get("title")?,
        date: row.try_get("date")?,
        time: row.try_get("time")?,
        location: row.try_get("location")?,
        budget: row.try_get("budget")?,
        memo: row.try_get("memo")?,
        status: EventStatus::from_db(&status),
    })
}

fn milestone_from_row(row: &PgRow) -> std::result::Result<Milestone, sqlx::Error> {
    let source: String = row.try_get("source")?;
    Ok(Milestone {
        milestone_id: row.try_get("milestone_id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        due_date: row.try_get("due_date")?,
        completed: row.try_get("completed")?,
        source: MilestoneSource::from_db(&source),
        notes: row.try_get("notes")?,
    })
}

fn summary_from_row(row: &PgRow) -> std::result::Result<ConversationSummary, sqlx::Error> {
    Ok(ConversationSummary {
        summary_id: row.try_get("summary_id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        latest: row.try_get("latest")?,
        created_at: row.try_get("created_at")?,
    })
}

fn catalog_entry_from_row(row: &PgRow) -> std::result::Result<CatalogEntry, sqlx::Error> {
    let vendor_id: i64 = row.try_get("vendor_id")?;
    Ok(CatalogEntry {
        offering: Offering {
            offering_id: row.try_get("offering_id")?,
            vendor_id,
            category: row.try_get("category")?,
            package_name: row.try_get("package_name")?,
            price: row.try_get("price")?,
            metadata: row.try_get("metadata")?,
        },
        vendor: Vendor {
            vendor_id,
            vendor_type: row.try_get("vendor_type")?,
            name: row.try_get("name")?,
            region: row.try_get("region")?,
            min_price: row.try_get("min_price")?,
        },
    })
}

// =============================
// Queries
// =============================

async fn insert_profile_if_missing(conn: &mut PgConnection, user_id: UserId) -> Result<()> {
    sqlx::query("INSERT INTO user_profile (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to create user profile"))?;
    Ok(())
}

async fn load_snapshot(conn: &mut PgConnection, user_id: UserId, for_update: bool) -> Result<MemorySnapshot> {
    let profile_sql = if for_update {
        "SELECT * FROM user_profile WHERE user_id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM user_profile WHERE user_id = $1"
    };
    let profile = sqlx::query(profile_sql)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| profile_from_row(&row))
        .map_err(db_error("Failed to load user profile"))?;

    let budgets: Vec<BudgetPreference> = sqlx::query("SELECT * FROM budget_preference WHERE user_id = $1 ORDER BY budget_id")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .and_then(|rows| rows.iter().map(budget_from_row).collect())
        .map_err(db_error("Failed to load budget preferences"))?;

    let events: Vec<Event> = sqlx::query("SELECT * FROM event WHERE user_id = $1 ORDER BY event_id")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .and_then(|rows| rows.iter().map(event_from_row).collect())
        .map_err(db_error("Failed to load events"))?;

    let milestones: Vec<Milestone> = sqlx::query("SELECT * FROM milestone WHERE user_id = $1 ORDER BY due_date, milestone_id")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .and_then(|rows| rows.iter().map(milestone_from_row).collect())
        .map_err(db_error("Failed to load milestones"))?;

    let latest_summary: Option<ConversationSummary> = sqlx::query("SELECT * FROM conversation_summary WHERE user_id = $1 AND latest")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .and_then(|row| row.as_ref().map(summary_from_row).transpose())
        .map_err(db_error("Failed to load latest summary"))?;

    Ok(MemorySnapshot {
        profile,
        budgets,
        events,
        milestones,
        latest_summary,
    })
}

async fn write_profile(conn: &mut PgConnection, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE user_profile
        SET name = $2, region = $3, contact = $4, notes = $5, total_budget = $6,
            wedding_date = $7, guest_count = $8, updated_at = $9
        WHERE user_id = $1
        "#,
    )
    .bind(profile.user_id)
    .bind(&profile.name)
    .bind(&profile.region)
    .bind(&profile.contact)
    .bind(&profile.notes)
    .bind(profile.total_budget)
    .bind(profile.wedding_date)
    .bind(profile.guest_count.map(|g| g as i32))
    .bind(profile.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("Failed to update user profile"))?;
    Ok(())
}

async fn write_budget(conn: &mut PgConnection, row: &BudgetPreference) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO budget_preference (user_id, category, min_amount, max_amount, locked, notes, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, category) DO UPDATE
        SET min_amount = EXCLUDED.min_amount, max_amount = EXCLUDED.max_amount,
            locked = EXCLUDED.locked, notes = EXCLUDED.notes, updated_at = EXCLUDED.updated_at
        RETURNING budget_id
        "#,
    )
    .bind(row.user_id)
    .bind(&row.category)
    .bind(row.min_amount)
    .bind(row.max_amount)
    .bind(row.locked)
    .bind(&row.notes)
    .bind(row.updated_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Failed to save budget preference"))?;
    Ok(id)
}

async fn write_event(conn: &mut PgConnection, event: &Event) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE event
        SET title = $2, date = $3, time = $4, location = $5, memo = $6, status = $7
        WHERE event_id = $1
        "#,
    )
    .bind(event.event_id)
    .bind(&event.title)
    .bind(event.date)
    .bind(event.time)
    .bind(&event.location)
    .bind(&event.memo)
    .bind(event.status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error("Failed to update event"))?;
    Ok(())
}

/// Applies one change inside the open transaction, keeping `state` in step.
async fn apply_change(
    conn: &mut PgConnection,
    state: &mut MemorySnapshot,
    change: RecordChange,
) -> Result<AppliedChange> {
    let user_id = state.user_id();
    let now = Utc::now();

    let applied = match change {
        RecordChange::PatchProfile(patch) => {
            let next = apply_profile_patch(&state.profile, &patch, now);
            write_profile(conn, &next).await?;
            state.profile = next.clone();
            AppliedChange::ProfileUpdated(next)
        }
        RecordChange::UpsertBudget(write) => {
            let index = state.budgets.iter().position(|b| b.category == write.category);
            let existing = index.map(|i| state.budgets[i].clone());
            match decide_budget_write(existing.as_ref(), &write) {
                BudgetDecision::Conflict(conflict) => AppliedChange::BudgetConflict(conflict),
                BudgetDecision::Unchanged => AppliedChange::BudgetUnchanged { category: write.category },
                decision => {
                    let mut row = apply_budget_write(existing.as_ref(), &write, user_id, 0, now);
                    row.budget_id = write_budget(conn, &row).await?;
                    match index {
                        Some(i) => state.budgets[i] = row.clone(),
                        None => state.budgets.push(row.clone()),
                    }
                    AppliedChange::BudgetSaved {
                        preference: row,
                        created: decision == BudgetDecision::Insert,
                    }
                }
            }
        }
        RecordChange::CreateEvent(draft) => {
            let status = EventStatus::for_date(draft.date);
            let event_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO event (user_id, event_type, title, date, time, location, budget, memo, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING event_id
                "#,
            )
            .bind(user_id)
            .bind(&draft.event_type)
            .bind(&draft.title)
            .bind(draft.date)
            .bind(draft.time)
            .bind(&draft.location)
            .bind(draft.budget)
            .bind(&draft.memo)
            .bind(status.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error("Failed to create event"))?;

            let event = Event {
                event_id,
                user_id,
                event_type: draft.event_type,
                title: draft.title,
                date: draft.date,
                time: draft.time,
                location: draft.location,
                budget: draft.budget,
                memo: draft.memo,
                status,
            };
            state.events.push(event.clone());
            AppliedChange::EventCreated(event)
        }
        RecordChange::UpdateEvent(patch) => {
            match state.events.iter().position(|e| e.event_id == patch.event_id) {
                Some(i) => {
                    let next = apply_event_patch(&state.events[i], &patch);
                    write_event(conn, &next).await?;
                    state.events[i] = next.clone();
                    AppliedChange::EventUpdated(next)
                }
                None => AppliedChange::EventNotFound { event_id: patch.event_id },
            }
        }
        RecordChange::CancelEvent { event_id } => {
            match state.events.iter().position(|e| e.event_id == event_id) {
                Some(i) => {
                    let mut next = state.events[i].clone();
                    next.status = EventStatus::Cancelled;
                    write_event(conn, &next).await?;
                    state.events[i] = next.clone();
                    AppliedChange::EventCancelled(next)
                }
                None => AppliedChange::EventNotFound { event_id },
            }
        }
        RecordChange::SetMilestone { milestone_id, completed } => {
            match state.milestones.iter().position(|m| m.milestone_id == milestone_id) {
                Some(i) => {
                    let changed = match decide_milestone_toggle(&state.milestones[i], completed) {
                        MilestoneDecision::NoOp => false,
                        MilestoneDecision::Set(value) => {
                            sqlx::query("UPDATE milestone SET completed = $2 WHERE milestone_id = $1")
                                .bind(milestone_id)
                                .bind(value)
                                .execute(&mut *conn)
                                .await
                                .map_err(db_error("Failed to update milestone"))?;
                            state.milestones[i].completed = value;
                            true
                        }
                    };
                    AppliedChange::MilestoneSet {
                        milestone: state.milestones[i].clone(),
                        changed,
                    }
                }
                None => AppliedChange::MilestoneNotFound { milestone_id },
            }
        }
        RecordChange::GenerateMilestones { wedding_date } => {
            let (planned, skipped) = plan_generation(&state.milestones, wedding_date);
            let mut created = Vec::with_capacity(planned.len());
            for (title, due_date) in planned {
                let milestone_id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO milestone (user_id, title, due_date, completed, source)
                    VALUES ($1, $2, $3, FALSE, $4)
                    RETURNING milestone_id
                    "#,
                )
                .bind(user_id)
                .bind(&title)
                .bind(due_date)
                .bind(MilestoneSource::System.as_str())
                .fetch_one(&mut *conn)
                .await
                .map_err(db_error("Failed to create milestone"))?;

                created.push(Milestone {
                    milestone_id,
                    user_id,
                    title,
                    due_date,
                    completed: false,
                    source: MilestoneSource::System,
                    notes: None,
                });
            }
            state.milestones.extend(created.iter().cloned());
            AppliedChange::MilestonesGenerated { created, skipped }
        }
    };

    Ok(applied)
}

async fn insert_latest_summary(
    conn: &mut PgConnection,
    user_id: UserId,
    content: &str,
) -> Result<ConversationSummary> {
    sqlx::query("UPDATE conversation_summary SET latest = FALSE WHERE user_id = $1 AND latest")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to retire previous summary"))?;

    sqlx::query(
        r#"
        INSERT INTO conversation_summary (user_id, content, latest)
        VALUES ($1, $2, TRUE)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(content)
    .fetch_one(&mut *conn)
    .await
    .and_then(|row| summary_from_row(&row))
    .map_err(db_error("Failed to save summary"))
}

#[async_trait::async_trait]
impl MemoryStore for PostgresMemoryStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.ensure_schema().await?;
        let mut conn = self.pool.acquire().await.map_err(db_error("Failed to acquire connection"))?;
        insert_profile_if_missing(&mut conn, user_id).await?;

        sqlx::query("SELECT * FROM user_profile WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
            .and_then(|row| profile_from_row(&row))
            .map_err(db_error("Failed to load user profile"))
    }

    async fn snapshot(&self, user_id: UserId) -> Result<MemorySnapshot> {
        self.ensure_schema().await?;
        let mut conn = self.pool.acquire().await.map_err(db_error("Failed to acquire connection"))?;
        insert_profile_if_missing(&mut conn, user_id).await?;
        load_snapshot(&mut conn, user_id, false).await
    }

    async fn commit(&self, batch: MergeBatch) -> Result<MergeReport> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin merge transaction"))?;

        insert_profile_if_missing(&mut tx, batch.user_id).await?;
        let mut state = load_snapshot(&mut tx, batch.user_id, true).await?;

        let mut applied = Vec::with_capacity(batch.changes.len());
        for change in batch.changes {
            applied.push(apply_change(&mut tx, &mut state, change).await?);
        }

        let summary = match batch.summary {
            Some(content) => Some(insert_latest_summary(&mut tx, batch.user_id, &content).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit merge transaction"))?;

        if summary.is_some() {
            state.latest_summary = summary.clone();
        }
        debug!(user_id = %batch.user_id, applied = applied.len(), "Postgres commit");

        Ok(MergeReport {
            applied,
            summary,
            snapshot: state,
        })
    }

    async fn summaries(&self, user_id: UserId, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.ensure_schema().await?;
        sqlx::query(
            "SELECT * FROM conversation_summary WHERE user_id = $1 ORDER BY summary_id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .and_then(|rows| rows.iter().map(summary_from_row).collect())
        .map_err(db_error("Failed to list summaries"))
    }

    async fn promote_summary(&self, user_id: UserId, summary_id: i64) -> Result<ConversationSummary> {
        self.ensure_schema().await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin promotion transaction"))?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT summary_id FROM conversation_summary WHERE user_id = $1 AND summary_id = $2",
        )
        .bind(user_id)
        .bind(summary_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to look up summary"))?;

        if exists.is_none() {
            return Err(OrchestrationError::PersistenceError(format!(
                "summary {} not found for user {}",
                summary_id, user_id
            )));
        }

        sqlx::query("UPDATE conversation_summary SET latest = FALSE WHERE user_id = $1 AND latest")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to retire previous summary"))?;

        let promoted = sqlx::query(
            "UPDATE conversation_summary SET latest = TRUE WHERE summary_id = $1 RETURNING *",
        )
        .bind(summary_id)
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| summary_from_row(&row))
        .map_err(db_error("Failed to promote summary"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit summary promotion"))?;

        Ok(promoted)
    }
}

#[async_trait::async_trait]
impl CatalogSource for PostgresMemoryStore {
    async fn entries(&self, category: &str) -> Result<Vec<CatalogEntry>> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            SELECT o.offering_id, o.vendor_id, o.category, o.package_name, o.price, o.metadata,
                   v.vendor_type, v.name, v.region, v.min_price
            FROM offering o
            JOIN vendor v ON v.vendor_id = o.vendor_id
            WHERE o.category = $1
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .and_then(|rows| rows.iter().map(catalog_entry_from_row).collect())
        .map_err(db_error("Failed to load catalog"))
    }
}
