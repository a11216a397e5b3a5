// 6.0: position store. positions plus the secondary key spaces that make scans cheap:
//   positions      (type, id)                 -> Position
//   owner index    (owner, type)              -> id, owner -> {ids}
//   ratio index    (prefix, sortable ratio, id), with id -> current entry for O(log n) removal
//   deposits       (id, depositor)            -> Deposit
//   accrual state  type -> interest factor, type -> previous accrual time
//   totals         (type, debt denom)         -> aggregate principal
//   rounding slack type -> accruals that rounded, bounds how far the aggregate may trail positions
// everything is a BTreeMap so iteration order is the key order on every executor.
// while a checkpoint is open every write pushes the key's prior value onto an undo journal, so a
// rollback touches only what the operation wrote.

use crate::position::{Deposit, Position};
use crate::sortable::SortableRatio;
use crate::types::{Address, Amount, CollateralType, PositionId, Timestamp};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

type RatioKey = (u8, SortableRatio, PositionId);

/// Journal length when a checkpoint was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

// prior value of one key, written back on rollback
#[derive(Debug, Clone)]
enum Undo {
    Position((CollateralType, PositionId), Option<Position>),
    TypeOf(PositionId, Option<CollateralType>),
    OwnerType((Address, CollateralType), Option<PositionId>),
    OwnerIds(Address, Option<BTreeSet<PositionId>>),
    RatioIndex(RatioKey, bool),
    RatioOf(PositionId, Option<(u8, SortableRatio)>),
    Deposit((PositionId, Address), Option<Deposit>),
    TotalPrincipal((CollateralType, String), Option<Amount>),
    InterestFactor(CollateralType, Option<Decimal>),
    PreviousAccrual(CollateralType, Option<Timestamp>),
    RoundingSlack(CollateralType, Option<u128>),
    NextId(u64),
    PreviousDistribution(Option<Timestamp>),
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: BTreeMap<(CollateralType, PositionId), Position>,
    type_of: BTreeMap<PositionId, CollateralType>,
    owner_type: BTreeMap<(Address, CollateralType), PositionId>,
    owner_ids: BTreeMap<Address, BTreeSet<PositionId>>,
    ratio_index: BTreeSet<RatioKey>,
    ratio_of: BTreeMap<PositionId, (u8, SortableRatio)>,
    deposits: BTreeMap<(PositionId, Address), Deposit>,
    total_principal: BTreeMap<(CollateralType, String), Amount>,
    interest_factors: BTreeMap<CollateralType, Decimal>,
    previous_accrual: BTreeMap<CollateralType, Timestamp>,
    rounding_slack: BTreeMap<CollateralType, u128>,
    next_id: u64,
    previous_distribution: Option<Timestamp>,
    journal: Option<Vec<Undo>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    // 6.0.1: journal. checkpoints nest; the outermost one (length zero) closes the journal

    pub fn checkpoint(&mut self) -> Checkpoint {
        Checkpoint(self.journal.get_or_insert_with(Vec::new).len())
    }

    pub fn commit(&mut self, checkpoint: Checkpoint) {
        if checkpoint.0 == 0 {
            self.journal = None;
        }
    }

    /// Undoes every write made since `checkpoint`, newest first.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let entries = match self.journal.as_mut() {
            Some(journal) if journal.len() > checkpoint.0 => journal.split_off(checkpoint.0),
            _ => Vec::new(),
        };
        for entry in entries.into_iter().rev() {
            self.undo(entry);
        }
        if checkpoint.0 == 0 {
            self.journal = None;
        }
    }

    pub fn journal_len(&self) -> usize {
        self.journal.as_ref().map_or(0, Vec::len)
    }

    fn record(&mut self, entry: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(entry);
        }
    }

    fn undo(&mut self, entry: Undo) {
        match entry {
            Undo::Position(key, prior) => restore(&mut self.positions, key, prior),
            Undo::TypeOf(id, prior) => restore(&mut self.type_of, id, prior),
            Undo::OwnerType(key, prior) => restore(&mut self.owner_type, key, prior),
            Undo::OwnerIds(owner, prior) => restore(&mut self.owner_ids, owner, prior),
            Undo::RatioIndex(key, present) => {
                if present {
                    self.ratio_index.insert(key);
                } else {
                    self.ratio_index.remove(&key);
                }
            }
            Undo::RatioOf(id, prior) => restore(&mut self.ratio_of, id, prior),
            Undo::Deposit(key, prior) => restore(&mut self.deposits, key, prior),
            Undo::TotalPrincipal(key, prior) => restore(&mut self.total_principal, key, prior),
            Undo::InterestFactor(key, prior) => restore(&mut self.interest_factors, key, prior),
            Undo::PreviousAccrual(key, prior) => restore(&mut self.previous_accrual, key, prior),
            Undo::RoundingSlack(key, prior) => restore(&mut self.rounding_slack, key, prior),
            Undo::NextId(next_id) => self.next_id = next_id,
            Undo::PreviousDistribution(prior) => self.previous_distribution = prior,
        }
    }

    // 6.1: ids are one global sequence, so they are also unique per type
    pub fn next_position_id(&mut self) -> PositionId {
        self.record(Undo::NextId(self.next_id));
        let id = PositionId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    pub fn get_position(&self, collateral_type: &CollateralType, id: PositionId) -> Option<&Position> {
        self.positions.get(&(collateral_type.clone(), id))
    }

    pub fn get_position_by_id(&self, id: PositionId) -> Option<&Position> {
        let collateral_type = self.type_of.get(&id)?;
        self.get_position(collateral_type, id)
    }

    pub fn set_position(&mut self, position: Position) {
        let id = position.id;
        let key = (position.collateral_type.clone(), id);
        let prior_type = self.type_of.insert(id, position.collateral_type.clone());
        self.record(Undo::TypeOf(id, prior_type));
        let prior = self.positions.insert(key.clone(), position);
        self.record(Undo::Position(key, prior));
    }

    pub fn delete_position(&mut self, position: &Position) -> Option<Position> {
        let key = (position.collateral_type.clone(), position.id);
        let prior_type = self.type_of.remove(&position.id);
        self.record(Undo::TypeOf(position.id, prior_type));
        let prior = self.positions.remove(&key);
        self.record(Undo::Position(key, prior.clone()));
        prior
    }

    pub fn positions_of_type<'a>(&'a self, collateral_type: &CollateralType) -> impl Iterator<Item = &'a Position> + 'a {
        let start = (collateral_type.clone(), PositionId(0));
        let end = (collateral_type.clone(), PositionId(u64::MAX));
        self.positions.range(start..=end).map(|(_, p)| p)
    }

    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    // 6.2: owner index

    pub fn position_id_by_owner(&self, owner: &Address, collateral_type: &CollateralType) -> Option<PositionId> {
        self.owner_type
            .get(&(owner.clone(), collateral_type.clone()))
            .copied()
    }

    pub fn index_owner(&mut self, position: &Position) {
        let key = (position.owner.clone(), position.collateral_type.clone());
        let prior = self.owner_type.insert(key.clone(), position.id);
        self.record(Undo::OwnerType(key, prior));

        let prior_ids = self.owner_ids.get(&position.owner).cloned();
        self.record(Undo::OwnerIds(position.owner.clone(), prior_ids));
        self.owner_ids
            .entry(position.owner.clone())
            .or_default()
            .insert(position.id);
    }

    pub fn remove_owner_index(&mut self, position: &Position) {
        let key = (position.owner.clone(), position.collateral_type.clone());
        let prior = self.owner_type.remove(&key);
        self.record(Undo::OwnerType(key, prior));

        let prior_ids = self.owner_ids.get(&position.owner).cloned();
        if let Some(ids) = self.owner_ids.get_mut(&position.owner) {
            ids.remove(&position.id);
            if ids.is_empty() {
                self.owner_ids.remove(&position.owner);
            }
        }
        self.record(Undo::OwnerIds(position.owner.clone(), prior_ids));
    }

    pub fn owner_position_ids(&self, owner: &Address) -> Vec<PositionId> {
        self.owner_ids
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    // 6.3: ratio index. one entry per live position, replaced whole on every change

    pub fn insert_ratio(&mut self, prefix: u8, ratio: SortableRatio, id: PositionId) {
        self.remove_ratio(id);
        let key = (prefix, ratio, id);
        let added = self.ratio_index.insert(key);
        self.record(Undo::RatioIndex(key, !added));
        let prior = self.ratio_of.insert(id, (prefix, ratio));
        self.record(Undo::RatioOf(id, prior));
    }

    pub fn remove_ratio(&mut self, id: PositionId) -> Option<(u8, SortableRatio)> {
        let (prefix, ratio) = self.ratio_of.remove(&id)?;
        self.record(Undo::RatioOf(id, Some((prefix, ratio))));
        let key = (prefix, ratio, id);
        let removed = self.ratio_index.remove(&key);
        self.record(Undo::RatioIndex(key, removed));
        Some((prefix, ratio))
    }

    pub fn ratio_entry(&self, id: PositionId) -> Option<(u8, SortableRatio)> {
        self.ratio_of.get(&id).copied()
    }

    /// Entries of one prefix strictly below `threshold`, lowest ratio first. Lazy, so callers
    /// can stop early with `take`/`take_while`.
    pub fn iter_below(&self, prefix: u8, threshold: SortableRatio) -> impl Iterator<Item = (SortableRatio, PositionId)> + '_ {
        let start = (prefix, SortableRatio::MIN, PositionId(0));
        let end = (prefix, threshold, PositionId(0));
        self.ratio_index
            .range(start..end)
            .map(|(_, ratio, id)| (*ratio, *id))
    }

    pub fn ratio_entries(&self, prefix: u8) -> impl Iterator<Item = (SortableRatio, PositionId)> + '_ {
        self.ratio_index
            .iter()
            .filter(move |(p, _, _)| *p == prefix)
            .map(|(_, ratio, id)| (*ratio, *id))
    }

    pub fn ratio_index_len(&self) -> usize {
        self.ratio_index.len()
    }

    // 6.4: deposits

    pub fn get_deposit(&self, id: PositionId, depositor: &Address) -> Option<&Deposit> {
        self.deposits.get(&(id, depositor.clone()))
    }

    pub fn set_deposit(&mut self, deposit: Deposit) {
        let key = (deposit.position_id, deposit.depositor.clone());
        let prior = self.deposits.insert(key.clone(), deposit);
        self.record(Undo::Deposit(key, prior));
    }

    pub fn delete_deposit(&mut self, id: PositionId, depositor: &Address) -> Option<Deposit> {
        let key = (id, depositor.clone());
        let prior = self.deposits.remove(&key);
        self.record(Undo::Deposit(key, prior.clone()));
        prior
    }

    /// Deposits of a position in ascending depositor order.
    pub fn deposits_of(&self, id: PositionId) -> Vec<Deposit> {
        self.deposits
            .range((id, Address::new(""))..)
            .take_while(|((pid, _), _)| *pid == id)
            .map(|(_, d)| d.clone())
            .collect()
    }

    // 6.5: aggregate principal

    pub fn total_principal(&self, collateral_type: &CollateralType, denom: &str) -> Amount {
        self.total_principal
            .get(&(collateral_type.clone(), denom.to_string()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn set_total_principal(&mut self, collateral_type: &CollateralType, denom: &str, amount: Amount) {
        let key = (collateral_type.clone(), denom.to_string());
        let prior = self.total_principal.insert(key.clone(), amount);
        self.record(Undo::TotalPrincipal(key, prior));
    }

    /// Sum over every type. `None` on overflow.
    pub fn total_principal_all(&self, denom: &str) -> Option<Amount> {
        Amount::checked_sum(
            self.total_principal
                .iter()
                .filter(|((_, d), _)| d == denom)
                .map(|(_, a)| a),
        )
    }

    // 6.6: accrual state

    pub fn interest_factor(&self, collateral_type: &CollateralType) -> Option<Decimal> {
        self.interest_factors.get(collateral_type).copied()
    }

    pub fn set_interest_factor(&mut self, collateral_type: &CollateralType, factor: Decimal) {
        let prior = self.interest_factors.insert(collateral_type.clone(), factor);
        self.record(Undo::InterestFactor(collateral_type.clone(), prior));
    }

    pub fn previous_accrual_time(&self, collateral_type: &CollateralType) -> Option<Timestamp> {
        self.previous_accrual.get(collateral_type).copied()
    }

    pub fn set_previous_accrual_time(&mut self, collateral_type: &CollateralType, time: Timestamp) {
        let prior = self.previous_accrual.insert(collateral_type.clone(), time);
        self.record(Undo::PreviousAccrual(collateral_type.clone(), prior));
    }

    pub fn rounding_slack(&self, collateral_type: &CollateralType) -> u128 {
        self.rounding_slack.get(collateral_type).copied().unwrap_or(0)
    }

    pub fn add_rounding_slack(&mut self, collateral_type: &CollateralType) {
        let prior = self.rounding_slack.get(collateral_type).copied();
        self.record(Undo::RoundingSlack(collateral_type.clone(), prior));
        let slack = self.rounding_slack.entry(collateral_type.clone()).or_insert(0);
        *slack = slack.saturating_add(1);
    }

    pub fn previous_distribution_time(&self) -> Option<Timestamp> {
        self.previous_distribution
    }

    pub fn set_previous_distribution_time(&mut self, time: Timestamp) {
        self.record(Undo::PreviousDistribution(self.previous_distribution));
        self.previous_distribution = Some(time);
    }
}
