// =============================================================================
// Store — rusqlite-backed persistence for the Paper Engine (§4.E, §6)
// =============================================================================
//
// One table per collection -- orders, positions, trades, funds -- behind a
// single `Mutex<Connection>`, the way `vault_db.rs` in the paired example repo
// wraps one SQLite connection for a small set of keyed collections. Every
// write is a blocking call made from inside the Paper Engine's own mutex, so
// no additional async locking is needed here; `rusqlite::Connection` is not
// `Send`-shared, hence `parking_lot::Mutex` rather than the tokio one the
// example repo uses (this store is driven from sync code inside the engine).
// =============================================================================

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::paper_engine::funds::Funds;
use crate::paper_engine::order::{Order, OrderId};
use crate::paper_engine::position::{Position, PositionKey};
use crate::types::{OrderStatus, OrderType, Product, Side};

const FUNDS_SINGLETON_ID: &str = "global_state";

/// One append-only trade-log entry (§3 "Trade log entry").
#[derive(Debug, Clone, Serialize)]
pub struct TradeLogEntry {
    pub ts: DateTime<Utc>,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub qty: u64,
    pub price: f64,
    pub tag: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored data: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence handle for one Paper Engine instance (single user or the
/// default engine). `PaperEngineManager` opens one `Store` per user, each at
/// its own path (§3 supplement from `multi_user_paper_trading.py`).
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and by a fresh paper-mode session with
    /// no configured DSN.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                order_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                exchange TEXT NOT NULL,
                side TEXT NOT NULL,
                qty INTEGER NOT NULL,
                order_type TEXT NOT NULL,
                product TEXT NOT NULL,
                status TEXT NOT NULL,
                price REAL,
                trigger_price REAL,
                avg_price REAL,
                filled_qty INTEGER NOT NULL,
                pending_qty INTEGER NOT NULL,
                cancelled_qty INTEGER NOT NULL,
                tag TEXT,
                placed_at INTEGER NOT NULL,
                exchange_ts INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT NOT NULL,
                exchange TEXT NOT NULL,
                product TEXT NOT NULL,
                net_qty INTEGER NOT NULL,
                avg_price REAL NOT NULL,
                last_price REAL NOT NULL,
                buy_qty INTEGER NOT NULL,
                sell_qty INTEGER NOT NULL,
                buy_value REAL NOT NULL,
                sell_value REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                opened_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, exchange, product)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                order_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                qty INTEGER NOT NULL,
                price REAL NOT NULL,
                tag TEXT
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_trades_ts ON trades(ts ASC)", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS funds (
                id TEXT PRIMARY KEY,
                capital REAL NOT NULL,
                available REAL NOT NULL,
                invested REAL NOT NULL,
                reserved REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                daily_pnl REAL NOT NULL,
                total_pnl REAL NOT NULL,
                trades_today INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    // ---- orders ------------------------------------------------------

    pub fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO orders (
                order_id, symbol, exchange, side, qty, order_type, product, status,
                price, trigger_price, avg_price, filled_qty, pending_qty, cancelled_qty,
                tag, placed_at, exchange_ts
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)
            ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                price = excluded.price,
                trigger_price = excluded.trigger_price,
                avg_price = excluded.avg_price,
                filled_qty = excluded.filled_qty,
                pending_qty = excluded.pending_qty,
                cancelled_qty = excluded.cancelled_qty,
                qty = excluded.qty,
                exchange_ts = excluded.exchange_ts",
            params![
                order.order_id.0,
                order.symbol,
                order.exchange,
                order.side.to_string(),
                order.qty as i64,
                order.order_type.to_string(),
                order.product.to_string(),
                order.status.to_string(),
                order.price,
                order.trigger_price,
                order.avg_price,
                order.filled_qty as i64,
                order.pending_qty as i64,
                order.cancelled_qty as i64,
                order.tag,
                order.placed_at.timestamp_millis(),
                order.exchange_ts.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    pub fn load_orders(&self) -> StoreResult<Vec<Order>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT order_id, symbol, exchange, side, qty, order_type, product, status,
                    price, trigger_price, avg_price, filled_qty, pending_qty, cancelled_qty,
                    tag, placed_at, exchange_ts
             FROM orders ORDER BY placed_at ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_order)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let side: String = row.get(3)?;
        let order_type: String = row.get(5)?;
        let product: String = row.get(6)?;
        let status: String = row.get(7)?;
        let placed_at: i64 = row.get(15)?;
        let exchange_ts: Option<i64> = row.get(16)?;

        Ok(Order {
            order_id: OrderId(row.get(0)?),
            symbol: row.get(1)?,
            exchange: row.get(2)?,
            side: parse_side(&side),
            qty: row.get::<_, i64>(4)? as u64,
            order_type: parse_order_type(&order_type),
            product: Product::from_str(&product).unwrap_or_default(),
            status: parse_order_status(&status),
            price: row.get(8)?,
            trigger_price: row.get(9)?,
            avg_price: row.get(10)?,
            filled_qty: row.get::<_, i64>(11)? as u64,
            pending_qty: row.get::<_, i64>(12)? as u64,
            cancelled_qty: row.get::<_, i64>(13)? as u64,
            tag: row.get(14)?,
            placed_at: millis_to_utc(placed_at),
            exchange_ts: exchange_ts.map(millis_to_utc),
        })
    }

    // ---- positions -----------------------------------------------------

    pub fn upsert_position(&self, position: &Position) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO positions (
                symbol, exchange, product, net_qty, avg_price, last_price,
                buy_qty, sell_qty, buy_value, sell_value, unrealized_pnl, realized_pnl,
                opened_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
            ON CONFLICT(symbol, exchange, product) DO UPDATE SET
                net_qty = excluded.net_qty,
                avg_price = excluded.avg_price,
                last_price = excluded.last_price,
                buy_qty = excluded.buy_qty,
                sell_qty = excluded.sell_qty,
                buy_value = excluded.buy_value,
                sell_value = excluded.sell_value,
                unrealized_pnl = excluded.unrealized_pnl,
                realized_pnl = excluded.realized_pnl,
                updated_at = excluded.updated_at",
            params![
                position.symbol,
                position.exchange,
                position.product.to_string(),
                position.net_qty,
                position.avg_price,
                position.last_price,
                position.buy_qty as i64,
                position.sell_qty as i64,
                position.buy_value,
                position.sell_value,
                position.unrealized_pnl,
                position.realized_pnl,
                position.opened_at.timestamp_millis(),
                position.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_position(&self, key: &PositionKey) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM positions WHERE symbol = ?1 AND exchange = ?2 AND product = ?3",
            params![key.symbol, key.exchange, key.product.to_string()],
        )?;
        Ok(())
    }

    pub fn load_positions(&self) -> StoreResult<Vec<Position>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, exchange, product, net_qty, avg_price, last_price,
                    buy_qty, sell_qty, buy_value, sell_value, unrealized_pnl, realized_pnl,
                    opened_at, updated_at
             FROM positions",
        )?;
        let rows = stmt.query_map([], |row| {
            let product: String = row.get(2)?;
            let opened_at: i64 = row.get(12)?;
            let updated_at: i64 = row.get(13)?;
            Ok(Position {
                symbol: row.get(0)?,
                exchange: row.get(1)?,
                product: Product::from_str(&product).unwrap_or_default(),
                net_qty: row.get(3)?,
                avg_price: row.get(4)?,
                last_price: row.get(5)?,
                buy_qty: row.get::<_, i64>(6)? as u64,
                sell_qty: row.get::<_, i64>(7)? as u64,
                buy_value: row.get(8)?,
                sell_value: row.get(9)?,
                unrealized_pnl: row.get(10)?,
                realized_pnl: row.get(11)?,
                opened_at: millis_to_utc(opened_at),
                updated_at: millis_to_utc(updated_at),
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // ---- trade log (append-only) ---------------------------------------

    pub fn append_trade(&self, entry: &TradeLogEntry) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO trades (ts, order_id, symbol, side, qty, price, tag)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                entry.ts.timestamp_millis(),
                entry.order_id.0,
                entry.symbol,
                entry.side.to_string(),
                entry.qty as i64,
                entry.price,
                entry.tag,
            ],
        )?;
        Ok(())
    }

    pub fn load_trades(&self) -> StoreResult<Vec<TradeLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ts, order_id, symbol, side, qty, price, tag FROM trades ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let ts: i64 = row.get(0)?;
            let side: String = row.get(3)?;
            Ok(TradeLogEntry {
                ts: millis_to_utc(ts),
                order_id: OrderId(row.get(1)?),
                symbol: row.get(2)?,
                side: parse_side(&side),
                qty: row.get::<_, i64>(4)? as u64,
                price: row.get(5)?,
                tag: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // ---- funds (singleton) ----------------------------------------------

    pub fn upsert_funds(&self, funds: &Funds) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO funds (
                id, capital, available, invested, reserved,
                realized_pnl, daily_pnl, total_pnl, trades_today, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
            ON CONFLICT(id) DO UPDATE SET
                capital = excluded.capital,
                available = excluded.available,
                invested = excluded.invested,
                reserved = excluded.reserved,
                realized_pnl = excluded.realized_pnl,
                daily_pnl = excluded.daily_pnl,
                total_pnl = excluded.total_pnl,
                trades_today = excluded.trades_today,
                updated_at = excluded.updated_at",
            params![
                FUNDS_SINGLETON_ID,
                funds.capital,
                funds.available,
                funds.invested,
                funds.reserved,
                funds.realized_pnl,
                funds.daily_pnl,
                funds.total_pnl,
                funds.trades_today,
                funds.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn load_funds(&self) -> StoreResult<Option<Funds>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT capital, available, invested, reserved, realized_pnl, daily_pnl,
                    total_pnl, trades_today, updated_at
             FROM funds WHERE id = ?1",
            params![FUNDS_SINGLETON_ID],
            |row| {
                let updated_at: i64 = row.get(8)?;
                Ok(Funds {
                    capital: row.get(0)?,
                    available: row.get(1)?,
                    invested: row.get(2)?,
                    reserved: row.get(3)?,
                    realized_pnl: row.get(4)?,
                    daily_pnl: row.get(5)?,
                    total_pnl: row.get(6)?,
                    trades_today: row.get(7)?,
                    updated_at: millis_to_utc(updated_at),
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_side(s: &str) -> Side {
    match s {
        "SELL" => Side::Sell,
        _ => Side::Buy,
    }
}

fn parse_order_type(s: &str) -> OrderType {
    match s {
        "LIMIT" => OrderType::Limit,
        "SL" => OrderType::Sl,
        "SL-M" => OrderType::SlM,
        _ => OrderType::Market,
    }
}

fn parse_order_status(s: &str) -> OrderStatus {
    match s {
        "OPEN" => OrderStatus::Open,
        "COMPLETE" => OrderStatus::Complete,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, Product, Side};

    #[test]
    fn order_round_trips_through_sqlite() {
        let store = Store::open_in_memory().unwrap();
        let order = Order::new_pending(
            "RELIANCE".into(),
            "NSE".into(),
            Side::Buy,
            10,
            OrderType::Market,
            Product::Mis,
            None,
            None,
            Some("BOT_RELIANCE".into()),
        );
        store.upsert_order(&order).unwrap();
        let loaded = store.load_orders().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].order_id, order.order_id);
        assert_eq!(loaded[0].qty, 10);
        assert_eq!(loaded[0].side, Side::Buy);
    }

    #[test]
    fn position_upsert_then_delete_on_close() {
        let store = Store::open_in_memory().unwrap();
        let key = PositionKey::new("RELIANCE", "NSE", Product::Mis);
        let mut pos = Position::new_or(None, &key);
        pos.apply_buy(10, 2500.0);
        store.upsert_position(&pos).unwrap();
        assert_eq!(store.load_positions().unwrap().len(), 1);

        store.delete_position(&key).unwrap();
        assert!(store.load_positions().unwrap().is_empty());
    }

    #[test]
    fn trade_log_is_append_only_and_ordered() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .append_trade(&TradeLogEntry {
                    ts: Utc::now(),
                    order_id: OrderId::new(),
                    symbol: "RELIANCE".into(),
                    side: Side::Buy,
                    qty: 1,
                    price: 100.0 + i as f64,
                    tag: None,
                })
                .unwrap();
        }
        assert_eq!(store.load_trades().unwrap().len(), 3);
    }

    #[test]
    fn funds_singleton_upserts_in_place() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_funds().unwrap().is_none());

        let mut funds = Funds::new(100_000.0);
        store.upsert_funds(&funds).unwrap();
        funds.apply_buy(25_000.0, false);
        store.upsert_funds(&funds).unwrap();

        let loaded = store.load_funds().unwrap().unwrap();
        assert_eq!(loaded.available, 75_000.0);
        assert_eq!(loaded.invested, 25_000.0);
    }
}
