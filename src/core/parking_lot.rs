use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::core::allocator::{LotState, ParkedCar, SlotAllocator};
use crate::errors::lot_error::LotError;


/// Shareable lot. Mutations take the write guard for the whole allocator so the
/// free set and both indices move together; queries only ever read.
pub(crate) struct ParkingLot {
    allocator: RwLock<SlotAllocator>,
}

#[async_trait]
pub(crate) trait LotManagement {
    async fn create_lot(&self, capacity: u32) -> Result<u32, LotError>;
    async fn expand_lot(&self, additional: u32) -> Result<(u32, u32), LotError>;
}

#[async_trait]
pub(crate) trait Occupancy {
    async fn park(&self, registration_number: String, color: String) -> Result<ParkedCar, LotError>;
    async fn unpark_by_slot(&self, slot_number: u32) -> Result<u32, LotError>;
    async fn unpark_by_registration(&self, registration_number: String) -> Result<u32, LotError>;
}

#[async_trait]
pub(crate) trait LotQueries {
    async fn status(&self) -> Result<Vec<ParkedCar>, LotError>;
    async fn registrations_by_color(&self, color: String) -> Result<Vec<String>, LotError>;
    async fn slots_by_color(&self, color: String) -> Result<Vec<u32>, LotError>;
    async fn slot_by_registration(&self, registration_number: String) -> Result<u32, LotError>;
    async fn current_state(&self) -> LotState;
}

#[async_trait]
impl LotManagement for ParkingLot {
    async fn create_lot(&self, capacity: u32) -> Result<u32, LotError> {
        self.allocator.write().await.initialize(capacity)
    }

    async fn expand_lot(&self, additional: u32) -> Result<(u32, u32), LotError> {
        self.allocator.write().await.expand(additional)
    }
}

#[async_trait]
impl Occupancy for ParkingLot {
    async fn park(&self, registration_number: String, color: String) -> Result<ParkedCar, LotError> {
        self.allocator.write().await.park(&registration_number, &color)
    }

    async fn unpark_by_slot(&self, slot_number: u32) -> Result<u32, LotError> {
        self.allocator.write().await.unpark_by_slot(slot_number)
    }

    async fn unpark_by_registration(&self, registration_number: String) -> Result<u32, LotError> {
        self.allocator.write().await.unpark_by_registration(&registration_number)
    }
}

#[async_trait]
impl LotQueries for ParkingLot {
    async fn status(&self) -> Result<Vec<ParkedCar>, LotError> {
        self.allocator.read().await.status()
    }

    async fn registrations_by_color(&self, color: String) -> Result<Vec<String>, LotError> {
        self.allocator.read().await.registrations_by_color(&color)
    }

    async fn slots_by_color(&self, color: String) -> Result<Vec<u32>, LotError> {
        self.allocator.read().await.slots_by_color(&color)
    }

    async fn slot_by_registration(&self, registration_number: String) -> Result<u32, LotError> {
        self.allocator.read().await.slot_by_registration(&registration_number)
    }

    async fn current_state(&self) -> LotState {
        self.allocator.read().await.current_state()
    }
}

impl ParkingLot {
    pub fn new() -> Self {
        Self {
            allocator: RwLock::new(SlotAllocator::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::Semaphore;
    use crate::core::parking_lot::{LotManagement, LotQueries, Occupancy, ParkingLot};
    use crate::errors::lot_error::LotError;

    #[tokio::test]
    async fn test_lot_lifecycle() {
        let lot = ParkingLot::new();
        assert_eq!(Err(LotError::NotInitialized), lot.status().await);

        assert_eq!(3, lot.create_lot(3).await.unwrap());
        assert_eq!(1, lot.park("CAR-A".to_string(), "Red".to_string()).await.unwrap().slot_number);
        assert_eq!(2, lot.park("CAR-B".to_string(), "Blue".to_string()).await.unwrap().slot_number);
        assert_eq!(2, lot.unpark_by_registration("CAR-B".to_string()).await.unwrap());
        assert_eq!((3, 5), lot.expand_lot(2).await.unwrap());
        assert_eq!(vec![1], lot.slots_by_color("Red".to_string()).await.unwrap());
        assert_eq!(Err(LotError::AlreadyFree(2)), lot.unpark_by_slot(2).await);

        let state = lot.current_state().await;
        assert_eq!(5, state.total_slots);
        assert_eq!(1, state.occupied_count);
        assert_eq!(4, state.available_count);
    }

    #[tokio::test]
    async fn test_simultaneous_parking_hands_out_distinct_slots() {
        let lot = Arc::new(ParkingLot::new());
        lot.create_lot(50).await.unwrap();

        const MAX_CONCURRENT_ARRIVALS: usize = 8;
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_ARRIVALS));

        let mut handles = Vec::with_capacity(60);
        for i in 0..60 {
            let lot_clone = lot.clone();
            let semaphore_clone = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore_clone.acquire().await.unwrap();
                lot_clone.park(format!("CAR-{i}"), "White".to_string()).await
            });
            handles.push(handle);
        }

        let results = futures::future::join_all(handles).await;
        let mut slots = HashSet::new();
        let mut full = 0;
        for result in results {
            match result.unwrap() {
                Ok(car) => assert!(slots.insert(car.slot_number)),
                Err(LotError::Full) => full += 1,
                Err(e) => panic!("unexpected failure {e}"),
            }
        }

        assert_eq!(10, full);
        assert_eq!((1..=50).collect::<HashSet<u32>>(), slots);
        assert_eq!(0, lot.current_state().await.available_count);
        lot.allocator.read().await.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_simultaneous_arrivals_and_departures() {
        let lot = Arc::new(ParkingLot::new());
        lot.create_lot(20).await.unwrap();
        for i in 0..20 {
            lot.park(format!("OLD-{i}"), "Black".to_string()).await.unwrap();
        }

        let mut handles = Vec::with_capacity(40);
        for i in 0..20 {
            let leaving = lot.clone();
            handles.push(tokio::spawn(async move {
                leaving.unpark_by_registration(format!("OLD-{i}")).await.map(|_| ())
            }));
            let arriving = lot.clone();
            handles.push(tokio::spawn(async move {
                match arriving.park(format!("NEW-{i}"), "Silver".to_string()).await {
                    Ok(_) | Err(LotError::Full) => Ok(()),
                    Err(e) => Err(e),
                }
            }));
        }
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let allocator = lot.allocator.read().await;
        allocator.check_invariants().unwrap();
        assert!(allocator.registrations_by_color("Black").unwrap().is_empty());
    }
}
