use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use crate::errors::lot_error::LotError;


#[derive(Debug, Clone, PartialEq, Eq)]
struct Occupant {
    registration_number: String,
    color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParkedCar {
    pub slot_number: u32,
    pub registration_number: String,
    pub color: String,
}

/// Diagnostic snapshot of the lot, not meant for domain decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LotState {
    pub total_slots: u32,
    pub is_initialized: bool,
    pub occupied_count: usize,
    pub available_count: usize,
}

/// Owns every slot of one lot.
///
/// Slots `1..=high_water` have been handed out at least once since the lot was
/// created; each of them is either in `reclaimed` or a key of `occupied_slots`.
/// Slots above `high_water` up to `total_slots` have never been used and are
/// free without being stored anywhere. `registration_to_slot` is the inverse of
/// `occupied_slots` and is only ever touched together with it.
pub(crate) struct SlotAllocator {
    total_slots: u32,
    initialized: bool,
    high_water: u32,
    reclaimed: BinaryHeap<Reverse<u32>>,
    occupied_slots: AHashMap<u32, Occupant>,
    registration_to_slot: AHashMap<String, u32>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self {
            total_slots: 0,
            initialized: false,
            high_water: 0,
            reclaimed: BinaryHeap::new(),
            occupied_slots: AHashMap::new(),
            registration_to_slot: AHashMap::new(),
        }
    }

    pub fn initialize(&mut self, capacity: u32) -> Result<u32, LotError> {
        if capacity == 0 {
            return Err(LotError::InvalidArgument("Capacity must be a positive integer.".to_string()));
        }
        if self.initialized {
            warn!("Re-initializing parking lot with capacity {capacity}. {} parked car(s) will be discarded.",
                self.occupied_slots.len());
        }
        self.occupied_slots.clear();
        self.registration_to_slot.clear();
        self.reclaimed.clear();
        self.high_water = 0;
        self.total_slots = capacity;
        self.initialized = true;
        info!("Parking lot created with {capacity} slots.");
        Ok(capacity)
    }

    /// Appends `additional` slots after the current highest one. Returns `(old, new)` capacity.
    pub fn expand(&mut self, additional: u32) -> Result<(u32, u32), LotError> {
        self.ensure_initialized()?;
        if additional == 0 {
            return Err(LotError::InvalidArgument("Additional capacity must be a positive integer.".to_string()));
        }
        let old_capacity = self.total_slots;
        let new_capacity = old_capacity.checked_add(additional).ok_or_else(|| {
            LotError::InvalidArgument(format!("Cannot add {additional} slots to a lot of {old_capacity}."))
        })?;
        self.total_slots = new_capacity;
        info!("Parking lot expanded by {additional} slots. New total: {new_capacity}.");
        Ok((old_capacity, new_capacity))
    }

    fn available_count(&self) -> usize {
        self.reclaimed.len() + (self.total_slots - self.high_water) as usize
    }

    // Every reclaimed slot is at most `high_water`, so the heap wins whenever it has one.
    fn take_lowest_free(&mut self) -> Option<u32> {
        if let Some(Reverse(slot_number)) = self.reclaimed.pop() {
            return Some(slot_number);
        }
        if self.high_water < self.total_slots {
            self.high_water += 1;
            return Some(self.high_water);
        }
        None
    }

    /// Parks in the lowest numbered free slot.
    pub fn park(&mut self, registration_number: &str, color: &str) -> Result<ParkedCar, LotError> {
        self.ensure_initialized()?;
        if self.available_count() == 0 {
            return Err(LotError::Full);
        }
        if self.registration_to_slot.contains_key(registration_number) {
            return Err(LotError::AlreadyParked(registration_number.to_string()));
        }

        let slot_number = self.take_lowest_free().ok_or_else(|| {
            error!("no free slot left after reporting availability");
            LotError::Inconsistent("no free slot to hand out".to_string())
        })?;
        if self.occupied_slots.contains_key(&slot_number) {
            error!("slot {slot_number} was free and occupied at the same time");
            self.reclaimed.push(Reverse(slot_number));
            return Err(LotError::Inconsistent(format!("slot {slot_number} is already occupied")));
        }

        self.occupied_slots.insert(slot_number, Occupant {
            registration_number: registration_number.to_string(),
            color: color.to_string(),
        });
        self.registration_to_slot.insert(registration_number.to_string(), slot_number);
        info!("Car {registration_number} ({color}) parked in slot {slot_number}.");
        Ok(ParkedCar {
            slot_number,
            registration_number: registration_number.to_string(),
            color: color.to_string(),
        })
    }

    pub fn unpark_by_slot(&mut self, slot_number: u32) -> Result<u32, LotError> {
        self.ensure_initialized()?;
        if slot_number == 0 || slot_number > self.total_slots {
            return Err(LotError::invalid_slot(slot_number.into(), self.total_slots));
        }
        let occupant = self.occupied_slots.remove(&slot_number)
            .ok_or(LotError::AlreadyFree(slot_number))?;
        let indexed = self.registration_to_slot.remove(&occupant.registration_number);
        self.reclaimed.push(Reverse(slot_number));

        if indexed != Some(slot_number) {
            error!("reverse index had {:?} for {} leaving slot {slot_number}", indexed, occupant.registration_number);
            return Err(LotError::Inconsistent(format!(
                "registration {} was not indexed to slot {slot_number}", occupant.registration_number)));
        }
        info!("Slot {slot_number} freed. Car {} left.", occupant.registration_number);
        Ok(slot_number)
    }

    pub fn unpark_by_registration(&mut self, registration_number: &str) -> Result<u32, LotError> {
        let slot_number = self.slot_by_registration(registration_number)?;
        self.unpark_by_slot(slot_number)
    }

    pub fn status(&self) -> Result<Vec<ParkedCar>, LotError> {
        self.ensure_initialized()?;
        let mut cars: Vec<ParkedCar> = self.occupied_slots.iter()
            .map(|(slot, occupant)| ParkedCar {
                slot_number: *slot,
                registration_number: occupant.registration_number.clone(),
                color: occupant.color.clone(),
            })
            .collect();
        cars.sort_unstable_by_key(|car| car.slot_number);
        Ok(cars)
    }

    pub fn registrations_by_color(&self, color: &str) -> Result<Vec<String>, LotError> {
        let mut matches = self.occupants_with_color(color)?;
        matches.sort_unstable_by_key(|(slot, _)| *slot);
        Ok(matches.into_iter().map(|(_, occupant)| occupant.registration_number.clone()).collect())
    }

    pub fn slots_by_color(&self, color: &str) -> Result<Vec<u32>, LotError> {
        let mut slots: Vec<u32> = self.occupants_with_color(color)?
            .into_iter()
            .map(|(slot, _)| slot)
            .collect();
        slots.sort_unstable();
        Ok(slots)
    }

    pub fn slot_by_registration(&self, registration_number: &str) -> Result<u32, LotError> {
        self.ensure_initialized()?;
        self.registration_to_slot.get(registration_number)
            .copied()
            .ok_or_else(|| LotError::NotFound(registration_number.to_string()))
    }

    pub fn current_state(&self) -> LotState {
        LotState {
            total_slots: self.total_slots,
            is_initialized: self.initialized,
            occupied_count: self.occupied_slots.len(),
            available_count: self.available_count(),
        }
    }

    fn occupants_with_color(&self, color: &str) -> Result<Vec<(u32, &Occupant)>, LotError> {
        self.ensure_initialized()?;
        Ok(self.occupied_slots.iter()
            .filter(|(_, occupant)| occupant.color == color)
            .map(|(slot, occupant)| (*slot, occupant))
            .collect())
    }

    fn ensure_initialized(&self) -> Result<(), LotError> {
        if !self.initialized {
            return Err(LotError::NotInitialized);
        }
        Ok(())
    }

    /// Walks all three structures and reports the first bookkeeping mismatch.
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), LotError> {
        let fault = |msg: String| Err(LotError::Inconsistent(msg));

        if !self.initialized {
            if self.total_slots != 0 || self.high_water != 0 || !self.reclaimed.is_empty()
                || !self.occupied_slots.is_empty() || !self.registration_to_slot.is_empty() {
                return fault("uninitialized lot carries state".to_string());
            }
            return Ok(());
        }
        if self.high_water > self.total_slots {
            return fault(format!("high water {} above {} slots", self.high_water, self.total_slots));
        }

        let mut reclaimed: Vec<u32> = self.reclaimed.iter().map(|Reverse(slot)| *slot).collect();
        reclaimed.sort_unstable();
        if reclaimed.windows(2).any(|w| w[0] == w[1]) {
            return fault("free set holds a slot twice".to_string());
        }
        if let Some(slot) = reclaimed.iter().find(|s| **s == 0 || **s > self.high_water) {
            return fault(format!("reclaimed slot {slot} was never handed out"));
        }
        if let Some(slot) = reclaimed.iter().find(|s| self.occupied_slots.contains_key(*s)) {
            return fault(format!("slot {slot} is both free and occupied"));
        }
        if let Some(slot) = self.occupied_slots.keys().find(|s| **s == 0 || **s > self.high_water) {
            return fault(format!("occupied slot {slot} above the handed out range"));
        }
        if reclaimed.len() + self.occupied_slots.len() != self.high_water as usize {
            return fault("reclaimed and occupied slots do not cover the handed out range".to_string());
        }
        if self.reclaimed.peek().map(|Reverse(slot)| *slot) != reclaimed.first().copied() {
            return fault("free set does not yield its smallest slot".to_string());
        }

        if self.registration_to_slot.len() != self.occupied_slots.len() {
            return fault("reverse index size differs from occupancy".to_string());
        }
        for (slot, occupant) in self.occupied_slots.iter() {
            if self.registration_to_slot.get(&occupant.registration_number) != Some(slot) {
                return fault(format!("{} not indexed to slot {slot}", occupant.registration_number));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use crate::core::allocator::{LotState, ParkedCar, SlotAllocator};
    use crate::errors::lot_error::LotError;

    fn lot_with(capacity: u32, cars: &[(&str, &str)]) -> SlotAllocator {
        let mut allocator = SlotAllocator::new();
        allocator.initialize(capacity).unwrap();
        for (reg, color) in cars {
            allocator.park(reg, color).unwrap();
        }
        allocator
    }

    #[test]
    pub fn test_parks_until_full() {
        let mut allocator = lot_with(2, &[]);
        assert_eq!(1, allocator.park("KA-01-HH-1234", "White").unwrap().slot_number);
        assert_eq!(2, allocator.park("KA-01-HH-9999", "Black").unwrap().slot_number);
        assert_eq!(Err(LotError::Full), allocator.park("KA-01-BB-0001", "Red"));
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_park_returns_the_record() {
        let mut allocator = lot_with(2, &[]);
        let expected = ParkedCar {
            slot_number: 1,
            registration_number: "KA-01-HH-1234".to_string(),
            color: "White".to_string(),
        };
        assert_eq!(expected, allocator.park("KA-01-HH-1234", "White").unwrap());
    }

    #[test]
    pub fn test_k_th_park_gets_slot_k() {
        let mut allocator = lot_with(20, &[]);
        for k in 1..=20u32 {
            assert_eq!(k, allocator.park(&format!("CAR-{k}"), "Grey").unwrap().slot_number);
        }
    }

    #[test]
    pub fn test_freed_slot_is_reused_first() {
        let mut allocator = lot_with(3, &[("A", "Red"), ("B", "Blue")]);
        assert_eq!(1, allocator.unpark_by_slot(1).unwrap());
        assert_eq!(2, allocator.current_state().available_count);
        assert_eq!(1, allocator.park("C", "Green").unwrap().slot_number);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_lowest_of_several_freed_slots_is_chosen() {
        let mut allocator = lot_with(6, &[("A", "Red"), ("B", "Red"), ("C", "Red"), ("D", "Red"), ("E", "Red")]);
        allocator.unpark_by_slot(4).unwrap();
        allocator.unpark_by_slot(2).unwrap();
        assert_eq!(2, allocator.park("F", "Red").unwrap().slot_number);
        assert_eq!(4, allocator.park("G", "Red").unwrap().slot_number);
        assert_eq!(6, allocator.park("H", "Red").unwrap().slot_number);
    }

    #[test]
    pub fn test_unpark_by_registration() {
        let mut allocator = lot_with(3, &[("A", "Red"), ("B", "Blue")]);
        assert_eq!(2, allocator.unpark_by_registration("B").unwrap());
        assert_eq!(Err(LotError::NotFound("B".to_string())), allocator.slot_by_registration("B"));
        assert_eq!(Err(LotError::NotFound("B".to_string())), allocator.unpark_by_registration("B"));
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_unpark_rejects_bad_slots() {
        let mut allocator = lot_with(3, &[("A", "Red"), ("B", "Blue")]);
        assert_eq!(Err(LotError::AlreadyFree(3)), allocator.unpark_by_slot(3));
        assert!(matches!(allocator.unpark_by_slot(0), Err(LotError::InvalidArgument(_))));
        assert!(matches!(allocator.unpark_by_slot(4), Err(LotError::InvalidArgument(_))));
        assert_eq!(2, allocator.current_state().occupied_count);
    }

    #[test]
    pub fn test_duplicate_registration_is_rejected() {
        let mut allocator = lot_with(3, &[("DUPLICATE-CAR", "Red")]);
        assert_eq!(Err(LotError::AlreadyParked("DUPLICATE-CAR".to_string())),
                   allocator.park("DUPLICATE-CAR", "Blue"));
        assert_eq!(2, allocator.current_state().available_count);

        allocator.park("OTHER", "Blue").unwrap();
        allocator.unpark_by_registration("DUPLICATE-CAR").unwrap();
        allocator.park("ANOTHER", "Blue").unwrap();
        assert_eq!(3, allocator.park("DUPLICATE-CAR", "Red").unwrap().slot_number);
    }

    #[test]
    pub fn test_full_is_reported_before_duplicate() {
        let mut allocator = lot_with(1, &[("A", "Red")]);
        assert_eq!(Err(LotError::Full), allocator.park("A", "Red"));
    }

    #[test]
    pub fn test_color_queries_are_slot_ordered() {
        let mut allocator = lot_with(5, &[("REG-A", "White"), ("REG-B", "Red"), ("REG-C", "White"), ("REG-D", "Blue")]);
        assert_eq!(vec!["REG-A".to_string(), "REG-C".to_string()], allocator.registrations_by_color("White").unwrap());
        assert_eq!(vec![1, 3], allocator.slots_by_color("White").unwrap());
        assert_eq!(Vec::<u32>::new(), allocator.slots_by_color("Green").unwrap());
        assert_eq!(Vec::<String>::new(), allocator.registrations_by_color("white").unwrap());

        allocator.unpark_by_slot(1).unwrap();
        allocator.park("REG-E", "White").unwrap();
        assert_eq!(vec!["REG-E".to_string(), "REG-C".to_string()], allocator.registrations_by_color("White").unwrap());
    }

    #[test]
    pub fn test_status_is_sorted() {
        let mut allocator = lot_with(4, &[("A", "Red"), ("B", "Blue"), ("C", "Red"), ("D", "Black")]);
        allocator.unpark_by_slot(2).unwrap();
        allocator.unpark_by_slot(1).unwrap();
        allocator.park("E", "Green").unwrap();
        let slots: Vec<u32> = allocator.status().unwrap().iter().map(|car| car.slot_number).collect();
        assert_eq!(vec![1, 3, 4], slots);
        assert_eq!("E", allocator.status().unwrap()[0].registration_number);
    }

    #[test]
    pub fn test_everything_but_initialize_needs_a_lot() {
        let mut allocator = SlotAllocator::new();
        assert_eq!(Err(LotError::NotInitialized), allocator.expand(2));
        assert_eq!(Err(LotError::NotInitialized), allocator.park("A", "Red"));
        assert_eq!(Err(LotError::NotInitialized), allocator.unpark_by_slot(1));
        assert_eq!(Err(LotError::NotInitialized), allocator.unpark_by_registration("A"));
        assert_eq!(Err(LotError::NotInitialized), allocator.status());
        assert_eq!(Err(LotError::NotInitialized), allocator.registrations_by_color("Red"));
        assert_eq!(Err(LotError::NotInitialized), allocator.slots_by_color("Red"));
        assert_eq!(Err(LotError::NotInitialized), allocator.slot_by_registration("A"));
        assert!(!allocator.current_state().is_initialized);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_initialize_rejects_zero_and_keeps_state() {
        let mut allocator = lot_with(2, &[("A", "Red")]);
        assert!(matches!(allocator.initialize(0), Err(LotError::InvalidArgument(_))));
        assert_eq!(1, allocator.slot_by_registration("A").unwrap());
        assert_eq!(2, allocator.current_state().total_slots);
    }

    #[test]
    pub fn test_reinitialize_discards_everything() {
        let mut allocator = lot_with(2, &[("A", "Red"), ("B", "Blue")]);
        assert_eq!(1, allocator.initialize(1).unwrap());
        let expected = LotState { total_slots: 1, is_initialized: true, occupied_count: 0, available_count: 1 };
        assert_eq!(expected, allocator.current_state());
        assert_eq!(Err(LotError::NotFound("A".to_string())), allocator.slot_by_registration("A"));
        assert_eq!(1, allocator.park("B", "Blue").unwrap().slot_number);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_expand_keeps_occupancy() {
        let mut allocator = lot_with(2, &[("CAR-A", "Red")]);
        assert_eq!((2, 4), allocator.expand(2).unwrap());
        let state = allocator.current_state();
        assert_eq!(4, state.total_slots);
        assert_eq!(3, state.available_count);
        assert_eq!(1, state.occupied_count);
        assert_eq!(2, allocator.park("CAR-B", "Red").unwrap().slot_number);
        assert_eq!(3, allocator.park("CAR-C", "Red").unwrap().slot_number);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_expand_on_a_full_lot() {
        let mut allocator = lot_with(1, &[("A", "Red")]);
        assert_eq!(Err(LotError::Full), allocator.park("B", "Red"));
        allocator.expand(1).unwrap();
        assert_eq!(2, allocator.park("B", "Red").unwrap().slot_number);
    }

    #[test]
    pub fn test_expand_rejects_bad_amounts() {
        let mut allocator = lot_with(5, &[]);
        assert!(matches!(allocator.expand(0), Err(LotError::InvalidArgument(_))));
        assert!(matches!(allocator.expand(u32::MAX), Err(LotError::InvalidArgument(_))));
        assert_eq!(5, allocator.current_state().total_slots);
        assert_eq!(5, allocator.current_state().available_count);
    }

    #[test]
    pub fn test_huge_lot_near_u32_max() {
        let mut allocator = SlotAllocator::new();
        assert_eq!(Ok(4_000_000_000), allocator.initialize(4_000_000_000));
        assert_eq!(1, allocator.park("A", "Red").unwrap().slot_number);
        assert_eq!(2, allocator.park("B", "Red").unwrap().slot_number);

        assert_eq!(Ok((4_000_000_000, u32::MAX)), allocator.expand(u32::MAX - 4_000_000_000));
        assert!(matches!(allocator.expand(1), Err(LotError::InvalidArgument(_))));
        let state = allocator.current_state();
        assert_eq!(u32::MAX, state.total_slots);
        assert_eq!(2, state.occupied_count);
        assert_eq!(u32::MAX as usize - 2, state.available_count);

        assert_eq!(Ok(1), allocator.unpark_by_slot(1));
        assert_eq!(1, allocator.park("C", "Blue").unwrap().slot_number);
        assert_eq!(3, allocator.park("D", "Blue").unwrap().slot_number);
        assert_eq!(Err(LotError::AlreadyFree(u32::MAX)), allocator.unpark_by_slot(u32::MAX));
        allocator.check_invariants().unwrap();

        allocator.initialize(u32::MAX).unwrap();
        assert_eq!(1, allocator.park("A", "Red").unwrap().slot_number);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_reclaimed_slots_come_before_unused_ones() {
        let mut allocator = lot_with(6, &[("A", "Red"), ("B", "Red"), ("C", "Red")]);
        allocator.unpark_by_slot(3).unwrap();
        allocator.unpark_by_slot(2).unwrap();
        allocator.check_invariants().unwrap();
        assert_eq!(2, allocator.park("D", "Red").unwrap().slot_number);
        assert_eq!(3, allocator.park("E", "Red").unwrap().slot_number);
        assert_eq!(4, allocator.park("F", "Red").unwrap().slot_number);
        assert_eq!(2, allocator.current_state().available_count);
        allocator.check_invariants().unwrap();
    }

    #[test]
    pub fn test_random_interleavings_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5107);
        let mut allocator = SlotAllocator::new();
        let mut parked: Vec<String> = vec![];

        for step in 0..5_000u32 {
            let before = allocator.current_state();
            match rng.gen_range(0..100) {
                0 => {
                    let capacity = rng.gen_range(1..16);
                    allocator.initialize(capacity).unwrap();
                    parked.clear();
                }
                1..=4 => {
                    if allocator.expand(rng.gen_range(1..4)).is_ok() {
                        let after = allocator.current_state();
                        assert_eq!(before.occupied_count, after.occupied_count);
                        assert_eq!(before.total_slots + (after.available_count - before.available_count) as u32,
                                   after.total_slots);
                    }
                }
                5..=54 => {
                    let reg = format!("CAR-{}", rng.gen_range(0..40));
                    let color = ["Red", "Blue", "White"][rng.gen_range(0..3usize)];
                    match allocator.park(&reg, color) {
                        Ok(car) => {
                            let smallest_free_before = (1..=before.total_slots)
                                .find(|s| !parked.iter().any(|p| allocator.slot_by_registration(p).ok() == Some(*s)))
                                .unwrap();
                            assert_eq!(smallest_free_before, car.slot_number);
                            parked.push(reg);
                        }
                        Err(LotError::Full) => assert_eq!(0, before.available_count),
                        Err(LotError::AlreadyParked(r)) => assert!(parked.contains(&r)),
                        Err(LotError::NotInitialized) => assert!(!before.is_initialized),
                        Err(e) => panic!("unexpected park failure at step {step}: {e}"),
                    }
                }
                55..=79 if !parked.is_empty() => {
                    let reg = parked.swap_remove(rng.gen_range(0..parked.len()));
                    allocator.unpark_by_registration(&reg).unwrap();
                }
                _ => {
                    let slot = rng.gen_range(0..=before.total_slots + 1);
                    if let Ok(freed) = allocator.unpark_by_slot(slot) {
                        parked.retain(|p| allocator.slot_by_registration(p).is_ok());
                        assert_eq!(slot, freed);
                    }
                }
            }
            if let Err(e) = allocator.check_invariants() {
                panic!("invariant broken at step {step}: {e}");
            }
            if allocator.current_state().is_initialized {
                assert_eq!(parked.len(), allocator.status().unwrap().len());
            }
        }
    }
}
