use std::collections::HashMap;
use std::sync::Arc;

pub type Lsn = u32;
pub type TxnId = u32;

pub type LogKey = String;
pub type LogValue = i32;

/// One operation of the key-value log trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    Begin,
    Commit,
    Abort,
    Insert {
        key: LogKey,
        value: LogValue,
    },
    Delete {
        key: LogKey,
        value: LogValue,
    },
    Update {
        old_key: LogKey,
        old_value: LogValue,
        new_key: LogKey,
        new_value: LogValue,
    },
}

/// A log record as the recovery manager sees it: its position in the log,
/// the back link along its transaction's chain and the operation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub prev_lsn: Option<Lsn>,
    pub txn_id: TxnId,
    pub op: LogOp,
}

pub type LogRecordRef = Arc<LogRecord>;

/// Allocates LSNs and keeps each transaction's last LSN so records chain
/// backwards. Owned by whoever produces the log; nothing here is global.
#[derive(Debug, Default)]
pub struct LogContext {
    next_lsn: Lsn,
    prev_lsn_map: HashMap<TxnId, Lsn>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&mut self, txn_id: TxnId, op: LogOp) -> LogRecordRef {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        let prev_lsn = match op {
            // a BEGIN starts the chain
            LogOp::Begin => None,
            _ => self.prev_lsn_map.get(&txn_id).copied(),
        };
        self.prev_lsn_map.insert(txn_id, lsn);
        Arc::new(LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            op,
        })
    }

    pub fn create_begin_log(&mut self, txn_id: TxnId) -> LogRecordRef {
        self.append(txn_id, LogOp::Begin)
    }

    pub fn create_commit_log(&mut self, txn_id: TxnId) -> LogRecordRef {
        self.append(txn_id, LogOp::Commit)
    }

    pub fn create_abort_log(&mut self, txn_id: TxnId) -> LogRecordRef {
        self.append(txn_id, LogOp::Abort)
    }

    pub fn create_insert_log(
        &mut self,
        txn_id: TxnId,
        key: LogKey,
        value: LogValue,
    ) -> LogRecordRef {
        self.append(txn_id, LogOp::Insert { key, value })
    }

    pub fn create_delete_log(
        &mut self,
        txn_id: TxnId,
        key: LogKey,
        value: LogValue,
    ) -> LogRecordRef {
        self.append(txn_id, LogOp::Delete { key, value })
    }

    pub fn create_update_log(
        &mut self,
        txn_id: TxnId,
        old_key: LogKey,
        old_value: LogValue,
        new_key: LogKey,
        new_value: LogValue,
    ) -> LogRecordRef {
        self.append(
            txn_id,
            LogOp::Update {
                old_key,
                old_value,
                new_key,
                new_value,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsns_are_monotonic_and_chained() {
        let mut ctx = LogContext::new();
        let begin = ctx.create_begin_log(1);
        let insert = ctx.create_insert_log(1, "a".to_string(), 1);
        let other = ctx.create_begin_log(2);
        let update = ctx.create_update_log(1, "a".to_string(), 1, "a".to_string(), 2);
        let commit = ctx.create_commit_log(1);
        assert_eq!(begin.lsn, 0);
        assert_eq!(begin.prev_lsn, None);
        assert_eq!(insert.prev_lsn, Some(0));
        assert_eq!(other.lsn, 2);
        assert_eq!(other.prev_lsn, None);
        assert_eq!(update.prev_lsn, Some(1));
        assert_eq!(commit.prev_lsn, Some(3));
    }
}
