use std::sync::Arc;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use crate::core::allocator::{LotState, ParkedCar};
use crate::errors::client_error::ClientError;
use crate::server::parking_server::{CreateLotRequest, CreateLotResponse, ExpandLotRequest, ExpandLotResponse,
                                    GenericResponse, ParkRequest, SlotResponse, UnparkResponse};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ParkingApi {
    async fn create_lot(&self, capacity: u32) -> Result<CreateLotResponse, ClientError>;
    async fn expand_lot(&self, add_capacity: u32) -> Result<ExpandLotResponse, ClientError>;
    async fn park(&self, registration_number: String, color: String) -> Result<ParkedCar, ClientError>;
    async fn unpark_by_slot(&self, slot_number: u32) -> Result<UnparkResponse, ClientError>;
    async fn unpark_by_registration(&self, registration_number: String) -> Result<UnparkResponse, ClientError>;
    async fn status(&self) -> Result<Vec<ParkedCar>, ClientError>;
    async fn registrations_by_color(&self, color: String) -> Result<Vec<String>, ClientError>;
    async fn slots_by_color(&self, color: String) -> Result<Vec<u32>, ClientError>;
    async fn slot_by_registration(&self, registration_number: String) -> Result<u32, ClientError>;
    async fn current_state(&self) -> Result<LotState, ClientError>;
}

pub(crate) struct ParkingClient {
    client: Arc<Client>,
    address: String,
}

impl Clone for ParkingClient {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            address: self.address.clone(),
        }
    }
}

impl ParkingClient {
    pub fn new(client: Arc<Client>, address: String) -> Self {
        Self {
            client,
            address,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/parking-lots{}", self.address, path)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<GenericResponse>().await {
            Ok(body) => body.get_msg(),
            Err(_) => status.canonical_reason().unwrap_or("unexpected response").to_string(),
        };
        debug!("parking server answered {status} -> {message}");
        Err(ClientError::Api { status: status.as_u16(), message })
    }
}

#[async_trait]
impl ParkingApi for ParkingClient {
    async fn create_lot(&self, capacity: u32) -> Result<CreateLotResponse, ClientError> {
        let request = self.client.post(self.url(""))
            .json(&CreateLotRequest { capacity: capacity.into() });
        self.call(request).await
    }

    async fn expand_lot(&self, add_capacity: u32) -> Result<ExpandLotResponse, ClientError> {
        let request = self.client.patch(self.url(""))
            .json(&ExpandLotRequest { add_capacity: add_capacity.into() });
        self.call(request).await
    }

    async fn park(&self, registration_number: String, color: String) -> Result<ParkedCar, ClientError> {
        let request = self.client.post(self.url("/parkings"))
            .json(&ParkRequest { registration_number, color });
        self.call(request).await
    }

    async fn unpark_by_slot(&self, slot_number: u32) -> Result<UnparkResponse, ClientError> {
        let request = self.client.delete(self.url("/parkings"))
            .query(&[("slotNumber", slot_number.to_string())]);
        self.call(request).await
    }

    async fn unpark_by_registration(&self, registration_number: String) -> Result<UnparkResponse, ClientError> {
        let request = self.client.delete(self.url("/parkings"))
            .query(&[("registrationNumber", registration_number)]);
        self.call(request).await
    }

    async fn status(&self) -> Result<Vec<ParkedCar>, ClientError> {
        self.call(self.client.get(self.url("/status"))).await
    }

    async fn registrations_by_color(&self, color: String) -> Result<Vec<String>, ClientError> {
        let request = self.client.get(self.url("/registrations")).query(&[("color", color)]);
        self.call(request).await
    }

    async fn slots_by_color(&self, color: String) -> Result<Vec<u32>, ClientError> {
        let request = self.client.get(self.url("/slots")).query(&[("color", color)]);
        self.call(request).await
    }

    async fn slot_by_registration(&self, registration_number: String) -> Result<u32, ClientError> {
        let request = self.client.get(self.url("/slots"))
            .query(&[("registrationNumber", registration_number)]);
        let slot: SlotResponse = self.call(request).await?;
        Ok(slot.slot_number)
    }

    async fn current_state(&self) -> Result<LotState, ClientError> {
        self.call(self.client.get(self.url("/internal-state"))).await
    }
}
