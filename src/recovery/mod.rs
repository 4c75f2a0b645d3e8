use std::collections::{BTreeMap, HashMap};

mod log;

pub use self::log::{LogContext, LogKey, LogOp, LogRecord, LogRecordRef, LogValue, Lsn, TxnId};

pub type KvDatabase = HashMap<LogKey, LogValue>;
pub type ActiveTxns = HashMap<TxnId, Lsn>;

/// Recovery starting point: the log position the store is known to reflect,
/// the transactions that were live then and the data as persisted.
#[derive(Debug, Default, Clone)]
pub struct CheckPoint {
    pub checkpoint_lsn: Option<Lsn>,
    pub active_txns: ActiveTxns,
    pub persist_data: KvDatabase,
}

impl CheckPoint {
    pub fn new(checkpoint_lsn: Lsn) -> Self {
        Self {
            checkpoint_lsn: Some(checkpoint_lsn),
            ..Self::default()
        }
    }

    pub fn add_active_txn(&mut self, txn_id: TxnId, last_lsn: Lsn) {
        self.active_txns.insert(txn_id, last_lsn);
    }

    pub fn add_data(&mut self, key: LogKey, value: LogValue) {
        self.persist_data.insert(key, value);
    }
}

/// Replays a key-value log trace from a checkpoint: redo rolls the store
/// forward, undo cancels whatever the surviving transactions left behind.
#[derive(Debug, Default)]
pub struct RecoveryManager {
    log_recs: BTreeMap<Lsn, LogRecordRef>,
    persist_lsn: Option<Lsn>,
    active_txns: ActiveTxns,
    data: KvDatabase,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, checkpoint: CheckPoint) {
        self.persist_lsn = checkpoint.checkpoint_lsn;
        self.active_txns = checkpoint.active_txns;
        self.data = checkpoint.persist_data;
    }

    pub fn append_log_rec(&mut self, record: LogRecordRef) {
        self.log_recs.insert(record.lsn, record);
    }

    pub fn database(&self) -> &KvDatabase {
        &self.data
    }

    pub fn active_txns(&self) -> &ActiveTxns {
        &self.active_txns
    }

    /// Roll forward from the checkpoint LSN. Commits retire transactions;
    /// an abort undoes its transaction on the spot by walking the chain.
    pub fn redo_phase(&mut self) {
        let start = self.persist_lsn.unwrap_or(0);
        let records = self
            .log_recs
            .range(start..)
            .map(|(_, record)| record.clone())
            .collect::<Vec<_>>();
        for record in records {
            match &record.op {
                LogOp::Begin => {
                    self.active_txns.insert(record.txn_id, record.lsn);
                }
                LogOp::Insert { key, value } => {
                    self.data.insert(key.clone(), *value);
                    self.active_txns.insert(record.txn_id, record.lsn);
                }
                LogOp::Delete { key, .. } => {
                    self.data.remove(key);
                    self.active_txns.insert(record.txn_id, record.lsn);
                }
                LogOp::Update {
                    new_key, new_value, ..
                } => {
                    self.data.insert(new_key.clone(), *new_value);
                    self.active_txns.insert(record.txn_id, record.lsn);
                }
                LogOp::Commit => {
                    self.active_txns.remove(&record.txn_id);
                }
                LogOp::Abort => {
                    if let Some(prev_lsn) = record.prev_lsn {
                        self.undo_transaction(prev_lsn);
                    }
                    self.active_txns.remove(&record.txn_id);
                }
            }
        }
    }

    /// Cancel every transaction still active after redo.
    pub fn undo_phase(&mut self) {
        let txns = self
            .active_txns
            .values()
            .copied()
            .collect::<Vec<_>>();
        for last_lsn in txns {
            self.undo_transaction(last_lsn);
        }
        self.active_txns.clear();
    }

    /// Walk one transaction's chain backwards, reverting each operation.
    /// Stops at the BEGIN record; a missing LSN breaks the chain.
    fn undo_transaction(&mut self, last_lsn: Lsn) {
        let mut current = Some(last_lsn);
        while let Some(lsn) = current {
            let Some(record) = self.log_recs.get(&lsn).cloned() else {
                break;
            };
            match &record.op {
                LogOp::Insert { key, .. } => {
                    self.data.remove(key);
                }
                LogOp::Delete { key, value } => {
                    self.data.insert(key.clone(), *value);
                }
                LogOp::Update {
                    old_key, old_value, ..
                } => {
                    self.data.insert(old_key.clone(), *old_value);
                }
                LogOp::Begin => break,
                LogOp::Commit | LogOp::Abort => {}
            }
            current = record.prev_lsn;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redo_then_undo_restores_consistency() {
        // Begin(T1); Insert(T1, a=1); Begin(T2); Update(T2, a: 1 -> 2);
        // Commit(T1); crash
        let mut ctx = LogContext::new();
        let mut manager = RecoveryManager::new();
        manager.init(CheckPoint::default());
        manager.append_log_rec(ctx.create_begin_log(1));
        manager.append_log_rec(ctx.create_insert_log(1, "a".to_string(), 1));
        manager.append_log_rec(ctx.create_begin_log(2));
        manager.append_log_rec(ctx.create_update_log(
            2,
            "a".to_string(),
            1,
            "a".to_string(),
            2,
        ));
        manager.append_log_rec(ctx.create_commit_log(1));

        manager.redo_phase();
        assert_eq!(manager.database().get("a"), Some(&2));
        assert_eq!(manager.active_txns().len(), 1);
        assert!(manager.active_txns().contains_key(&2));

        manager.undo_phase();
        assert_eq!(manager.database().get("a"), Some(&1));
        assert!(manager.active_txns().is_empty());
    }

    #[test]
    fn abort_during_redo_rolls_back() {
        let mut ctx = LogContext::new();
        let mut manager = RecoveryManager::new();
        manager.init(CheckPoint::default());
        manager.append_log_rec(ctx.create_begin_log(1));
        manager.append_log_rec(ctx.create_insert_log(1, "x".to_string(), 10));
        manager.append_log_rec(ctx.create_delete_log(1, "x".to_string(), 10));
        manager.append_log_rec(ctx.create_abort_log(1));

        manager.redo_phase();
        assert!(manager.database().is_empty());
        assert!(manager.active_txns().is_empty());
    }

    #[test]
    fn recovery_starts_from_checkpoint() {
        let mut ctx = LogContext::new();
        // records before the checkpoint must not be replayed
        let _stale_begin = ctx.create_begin_log(1);
        let stale_insert = ctx.create_insert_log(1, "old".to_string(), 1);
        let _stale_commit = ctx.create_commit_log(1);

        let mut checkpoint = CheckPoint::new(3);
        checkpoint.add_data("old".to_string(), 1);
        checkpoint.add_active_txn(2, 4);

        let mut manager = RecoveryManager::new();
        manager.init(checkpoint);
        manager.append_log_rec(stale_insert);
        let begin = ctx.create_begin_log(2);
        assert_eq!(begin.lsn, 3);
        manager.append_log_rec(begin);
        manager.append_log_rec(ctx.create_insert_log(2, "new".to_string(), 7));

        manager.redo_phase();
        assert_eq!(manager.database().get("old"), Some(&1));
        assert_eq!(manager.database().get("new"), Some(&7));

        manager.undo_phase();
        assert_eq!(manager.database().get("new"), None);
        assert_eq!(manager.database().get("old"), Some(&1));
        assert!(manager.active_txns().is_empty());
    }

    #[test]
    fn undo_tolerates_missing_records() {
        let mut manager = RecoveryManager::new();
        let mut checkpoint = CheckPoint::default();
        // the chain points at an LSN the log no longer holds
        checkpoint.add_active_txn(9, 120);
        checkpoint.add_data("k".to_string(), 5);
        manager.init(checkpoint);
        manager.undo_phase();
        assert_eq!(manager.database().get("k"), Some(&5));
        assert!(manager.active_txns().is_empty());
    }
}
