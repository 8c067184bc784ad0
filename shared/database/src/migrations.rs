use sqlx::PgPool;
use tix_utils::TixResult;

const TABLES: &[(&str, &str)] = &[
    (
        "tix_cases",
        r#"
        CREATE TABLE IF NOT EXISTS tix_cases (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            case_id VARCHAR NOT NULL,
            case_type_id VARCHAR NOT NULL,
            case_s_type_id VARCHAR NOT NULL,
            wf_id VARCHAR NOT NULL,
            wf_version VARCHAR NOT NULL,
            priority INTEGER NOT NULL,
            status_id VARCHAR NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            country_id VARCHAR NOT NULL DEFAULT '',
            prov_id VARCHAR NOT NULL DEFAULT '',
            dist_id VARCHAR NOT NULL DEFAULT '',
            case_sla INTEGER,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            start_at TIMESTAMPTZ,
            command_at TIMESTAMPTZ,
            receive_at TIMESTAMPTZ,
            arrive_at TIMESTAMPTZ,
            closed_at TIMESTAMPTZ,
            over_sla BOOLEAN NOT NULL DEFAULT FALSE,
            over_sla_date TIMESTAMPTZ,
            over_sla_count INTEGER NOT NULL DEFAULT 0,
            schedule_flag BOOLEAN NOT NULL DEFAULT FALSE,
            schedule_date TIMESTAMPTZ,
            integration_ref_number VARCHAR,
            device_metadata JSONB NOT NULL DEFAULT '{}',
            source VARCHAR NOT NULL,
            created_by VARCHAR NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_by VARCHAR NOT NULL,
            UNIQUE (org_id, case_id)
        )
        "#,
    ),
    (
        "tix_case_current_stage",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_current_stage (
            org_id VARCHAR NOT NULL,
            case_id VARCHAR NOT NULL,
            wf_id VARCHAR NOT NULL,
            version VARCHAR NOT NULL,
            node_id VARCHAR NOT NULL,
            node_type VARCHAR NOT NULL,
            section VARCHAR NOT NULL,
            data JSONB NOT NULL,
            pic VARCHAR,
            group_id VARCHAR,
            form_id VARCHAR,
            unit_id VARCHAR,
            username VARCHAR,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_by VARCHAR NOT NULL,
            PRIMARY KEY (org_id, case_id)
        )
        "#,
    ),
    (
        "tix_case_responders",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_responders (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            case_id VARCHAR NOT NULL,
            unit_id VARCHAR,
            user_owner VARCHAR,
            status_id VARCHAR NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR NOT NULL
        )
        "#,
    ),
    (
        "tix_case_history_events",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_history_events (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            case_id VARCHAR NOT NULL,
            event_type VARCHAR NOT NULL,
            full_msg TEXT NOT NULL,
            json_data JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by VARCHAR NOT NULL
        )
        "#,
    ),
    (
        "tix_case_attachments",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_attachments (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            case_id VARCHAR NOT NULL,
            url TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "tix_case_sequences",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_sequences (
            org_id VARCHAR NOT NULL,
            day VARCHAR NOT NULL,
            last_value BIGINT NOT NULL,
            PRIMARY KEY (org_id, day)
        )
        "#,
    ),
    (
        "tix_case_status",
        r#"
        CREATE TABLE IF NOT EXISTS tix_case_status (
            status_id VARCHAR PRIMARY KEY,
            name_th VARCHAR NOT NULL,
            name_en VARCHAR NOT NULL
        )
        "#,
    ),
    (
        "wf_definitions",
        r#"
        CREATE TABLE IF NOT EXISTS wf_definitions (
            org_id VARCHAR NOT NULL,
            wf_id VARCHAR NOT NULL,
            title VARCHAR NOT NULL,
            version VARCHAR NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (org_id, wf_id)
        )
        "#,
    ),
    (
        "wf_nodes",
        r#"
        CREATE TABLE IF NOT EXISTS wf_nodes (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            wf_id VARCHAR NOT NULL,
            version VARCHAR NOT NULL,
            node_id VARCHAR NOT NULL,
            node_type VARCHAR NOT NULL,
            section VARCHAR NOT NULL,
            data JSONB NOT NULL,
            UNIQUE (org_id, wf_id, version, node_id)
        )
        "#,
    ),
    (
        "case_sub_types",
        r#"
        CREATE TABLE IF NOT EXISTS case_sub_types (
            org_id VARCHAR NOT NULL,
            s_type_id VARCHAR NOT NULL,
            case_type_id VARCHAR NOT NULL,
            wf_id VARCHAR NOT NULL,
            case_sla VARCHAR,
            priority INTEGER,
            device_type VARCHAR,
            work_order_type VARCHAR,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            PRIMARY KEY (org_id, s_type_id)
        )
        "#,
    ),
    (
        "case_type_groups",
        r#"
        CREATE TABLE IF NOT EXISTS case_type_groups (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            group_type_id VARCHAR NOT NULL,
            en VARCHAR NOT NULL,
            th VARCHAR NOT NULL,
            case_type_ids TEXT[] NOT NULL DEFAULT '{}',
            prefix VARCHAR NOT NULL
        )
        "#,
    ),
    (
        "d_case_summary",
        r#"
        CREATE TABLE IF NOT EXISTS d_case_summary (
            org_id VARCHAR NOT NULL,
            date VARCHAR NOT NULL,
            hour VARCHAR NOT NULL,
            group_type_id VARCHAR NOT NULL,
            country_id VARCHAR NOT NULL,
            prov_id VARCHAR NOT NULL,
            dist_id VARCHAR NOT NULL,
            total BIGINT NOT NULL DEFAULT 0,
            in_sla BIGINT NOT NULL DEFAULT 0,
            over_sla BIGINT NOT NULL DEFAULT 0,
            case_duration BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (org_id, date, hour, group_type_id, country_id, prov_id, dist_id)
        )
        "#,
    ),
    (
        "area_districts",
        r#"
        CREATE TABLE IF NOT EXISTS area_districts (
            org_id VARCHAR NOT NULL,
            namespace VARCHAR NOT NULL,
            country_id VARCHAR NOT NULL,
            prov_id VARCHAR NOT NULL,
            dist_id VARCHAR NOT NULL,
            PRIMARY KEY (org_id, namespace)
        )
        "#,
    ),
    (
        "um_users",
        r#"
        CREATE TABLE IF NOT EXISTS um_users (
            id BIGSERIAL PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            username VARCHAR NOT NULL,
            emp_id VARCHAR,
            first_name VARCHAR,
            last_name VARCHAR,
            email VARCHAR,
            mobile VARCHAR,
            password_hash VARCHAR,
            user_type VARCHAR NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (org_id, username)
        )
        "#,
    ),
    (
        "mdm_units",
        r#"
        CREATE TABLE IF NOT EXISTS mdm_units (
            org_id VARCHAR NOT NULL,
            unit_id VARCHAR NOT NULL,
            username VARCHAR,
            is_login BOOLEAN NOT NULL DEFAULT FALSE,
            sts_id VARCHAR NOT NULL,
            latitude DOUBLE PRECISION,
            longitude DOUBLE PRECISION,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (org_id, unit_id)
        )
        "#,
    ),
    (
        "notifications",
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY,
            org_id VARCHAR NOT NULL,
            case_id VARCHAR,
            sender VARCHAR NOT NULL,
            sender_type VARCHAR NOT NULL,
            event_type VARCHAR NOT NULL,
            message TEXT NOT NULL,
            recipients JSONB NOT NULL DEFAULT '[]',
            data JSONB NOT NULL DEFAULT 'null',
            hidden BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    // One case per inbound work order; replaces the earlier non-unique lookup index.
    "DROP INDEX IF EXISTS idx_tix_cases_ref",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tix_cases_ref_unique ON tix_cases(org_id, integration_ref_number) \
     WHERE integration_ref_number IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_tix_cases_status ON tix_cases(status_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_tix_case_responders_case ON tix_case_responders(org_id, case_id)",
    "CREATE INDEX IF NOT EXISTS idx_tix_case_history_case ON tix_case_history_events(org_id, case_id)",
    "CREATE INDEX IF NOT EXISTS idx_case_sub_types_wo ON case_sub_types(org_id, device_type, work_order_type)",
    "CREATE INDEX IF NOT EXISTS idx_d_case_summary_day ON d_case_summary(org_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_org ON notifications(org_id, created_at)",
];

pub async fn run_postgres_migrations(pool: &PgPool) -> TixResult<()> {
    tracing::info!("Running PostgreSQL migrations");

    for (table, ddl) in TABLES {
        tracing::debug!(table, "Ensuring table");
        sqlx::query(ddl).execute(pool).await?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!(tables = TABLES.len(), "PostgreSQL migrations completed successfully");
    Ok(())
}
