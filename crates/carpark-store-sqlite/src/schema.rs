//! SQL schema for the car park SQLite store.
//!
//! Executed once at connection startup. Timestamps are fixed-width RFC 3339
//! UTC strings (microsecond precision) so text comparison is chronological.
//! Money is stored as decimal text and only ever compared in Rust.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS zones (
    zone_id     TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    level       INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

-- `status` is the persisted latch; 'reserved' is only ever derived.
CREATE TABLE IF NOT EXISTS spaces (
    space_id    TEXT PRIMARY KEY,
    zone_id     TEXT NOT NULL REFERENCES zones(zone_id),
    label       TEXT NOT NULL,
    space_type  TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'available'
                CHECK (status IN ('available', 'occupied', 'maintenance')),
    UNIQUE (zone_id, label)
);

CREATE TABLE IF NOT EXISTS vehicles (
    vehicle_id    TEXT PRIMARY KEY,
    license_plate TEXT NOT NULL UNIQUE,
    is_ev         INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rates (
    rate_id        TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    zone_id        TEXT REFERENCES zones(zone_id),
    kind           TEXT NOT NULL,   -- 'hourly' | 'daily' | 'flat'
    amount         TEXT NOT NULL,
    grace_minutes  INTEGER NOT NULL DEFAULT 0,
    effective_from TEXT NOT NULL,
    effective_to   TEXT,
    active         INTEGER NOT NULL DEFAULT 1,
    peak_start     TEXT,            -- HH:MM:SS UTC, inclusive
    peak_end       TEXT,            -- HH:MM:SS UTC, inclusive
    peak_multiplier TEXT,
    CHECK ((peak_start IS NULL) = (peak_end IS NULL)
       AND (peak_start IS NULL) = (peak_multiplier IS NULL))
);

CREATE TABLE IF NOT EXISTS discounts (
    discount_id TEXT PRIMARY KEY,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,      -- 'percentage' | 'fixed_amount' | 'free_hours'
    value       TEXT NOT NULL,
    valid_from  TEXT NOT NULL,
    valid_to    TEXT NOT NULL,
    max_uses    INTEGER,
    uses        INTEGER NOT NULL DEFAULT 0,
    active      INTEGER NOT NULL DEFAULT 1,
    CHECK (max_uses IS NULL OR uses <= max_uses)
);

CREATE TABLE IF NOT EXISTS membership_plans (
    plan_id          TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    discount_percent TEXT NOT NULL,
    included_hours   INTEGER,
    duration_months  INTEGER NOT NULL DEFAULT 1 CHECK (duration_months > 0),
    active           INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS memberships (
    membership_id TEXT PRIMARY KEY,
    plan_id       TEXT NOT NULL REFERENCES membership_plans(plan_id),
    hours_used    TEXT NOT NULL DEFAULT '0',
    valid_from    TEXT NOT NULL,    -- YYYY-MM-DD, inclusive
    valid_to      TEXT NOT NULL,    -- YYYY-MM-DD, inclusive
    status        TEXT NOT NULL DEFAULT 'active'
                  CHECK (status IN ('active', 'cancelled')),
    auto_renew    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS membership_vehicles (
    membership_id TEXT NOT NULL REFERENCES memberships(membership_id),
    vehicle_id    TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    PRIMARY KEY (membership_id, vehicle_id)
);

CREATE TABLE IF NOT EXISTS reservations (
    reservation_id TEXT PRIMARY KEY,
    vehicle_id     TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    zone_id        TEXT NOT NULL REFERENCES zones(zone_id),
    start_time     TEXT NOT NULL,
    end_time       TEXT NOT NULL,
    status         TEXT NOT NULL,
    confirmation   TEXT NOT NULL UNIQUE,
    created_at     TEXT NOT NULL,
    CHECK (start_time < end_time)
);

-- exit_time and the terminal status are written once, together.
CREATE TABLE IF NOT EXISTS sessions (
    session_id     TEXT PRIMARY KEY,
    vehicle_id     TEXT NOT NULL REFERENCES vehicles(vehicle_id),
    zone_id        TEXT NOT NULL REFERENCES zones(zone_id),
    space_id       TEXT NOT NULL REFERENCES spaces(space_id),
    reservation_id TEXT REFERENCES reservations(reservation_id),
    ticket         TEXT NOT NULL UNIQUE,
    entry_time     TEXT NOT NULL,
    entry_gate     TEXT,
    exit_time      TEXT,
    exit_gate      TEXT,
    status         TEXT NOT NULL,
    CHECK ((status = 'active') = (exit_time IS NULL))
);

CREATE TABLE IF NOT EXISTS payments (
    payment_id  TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES sessions(session_id),
    amount      TEXT NOT NULL,
    discount_id TEXT REFERENCES discounts(discount_id),
    settled     INTEGER NOT NULL DEFAULT 0,
    settled_at  TEXT,
    receipt     TEXT NOT NULL UNIQUE
);

CREATE UNIQUE INDEX IF NOT EXISTS sessions_active_vehicle_idx
    ON sessions(vehicle_id) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS sessions_active_space_idx
    ON sessions(space_id) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS payments_settled_idx
    ON payments(session_id) WHERE settled = 1;

CREATE INDEX IF NOT EXISTS spaces_zone_idx        ON spaces(zone_id);
CREATE INDEX IF NOT EXISTS sessions_zone_idx      ON sessions(zone_id, status);
CREATE INDEX IF NOT EXISTS reservations_zone_idx  ON reservations(zone_id, status);
CREATE INDEX IF NOT EXISTS membership_vehicle_idx ON membership_vehicles(vehicle_id);

PRAGMA user_version = 1;
";
