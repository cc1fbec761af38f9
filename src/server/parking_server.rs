use std::convert::Infallible;
use std::sync::Arc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};
use crate::config::Config;
use crate::core::parking_lot::{LotManagement, LotQueries, Occupancy, ParkingLot};
use crate::errors::lot_error::LotError;


const REGISTRATION_FORMAT_MSG: &str =
    "Registration number should contain only uppercase letters, numbers, and hyphens.";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CreateLotRequest {
    pub capacity: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ExpandLotRequest {
    pub add_capacity: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ParkRequest {
    pub registration_number: String,
    pub color: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateLotResponse {
    pub message: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExpandLotResponse {
    pub message: String,
    pub old_capacity: u32,
    pub new_capacity: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnparkResponse {
    pub message: String,
    pub freed_slot_number: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SlotResponse {
    pub slot_number: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct GenericResponse {
    success: bool,
    message: String,
}

impl GenericResponse {
    pub fn failure(message: String) -> Self {
        Self { success: false, message }
    }

    pub fn get_msg(&self) -> String { self.message.clone() }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UnparkQuery {
    slot_number: Option<String>,
    registration_number: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ColorQuery {
    color: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    color: Option<String>,
    registration_number: Option<String>,
}

fn reply_json<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn reply_error(status: StatusCode, message: &str) -> WithStatus<Json> {
    reply_json(&GenericResponse::failure(message.to_string()), status)
}

fn reply_lot_error(e: LotError) -> WithStatus<Json> {
    if e.is_internal() {
        error!("lot bookkeeping fault -> {e}");
    } else {
        debug!("request failed -> {e}");
    }
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    reply_error(status, &e.to_string())
}

fn positive_u32(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

fn is_valid_registration(registration_number: &str) -> bool {
    !registration_number.is_empty()
        && registration_number.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

async fn handle_create(req: CreateLotRequest, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let capacity = match positive_u32(req.capacity) {
        Some(capacity) => capacity,
        None => return Ok(reply_error(StatusCode::BAD_REQUEST, "Capacity must be a positive integer.")),
    };
    let resp = match lot.create_lot(capacity).await {
        Ok(capacity) => reply_json(&CreateLotResponse {
            message: "Parking lot created successfully.".to_string(),
            capacity,
        }, StatusCode::CREATED),
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_expand(req: ExpandLotRequest, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let additional = match positive_u32(req.add_capacity) {
        Some(additional) => additional,
        None => return Ok(reply_error(StatusCode::BAD_REQUEST, "Additional capacity must be a positive integer.")),
    };
    let resp = match lot.expand_lot(additional).await {
        Ok((old_capacity, new_capacity)) => reply_json(&ExpandLotResponse {
            message: format!("Added {additional} slots successfully."),
            old_capacity,
            new_capacity,
        }, StatusCode::OK),
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_park(req: ParkRequest, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    if req.registration_number.is_empty() {
        return Ok(reply_error(StatusCode::BAD_REQUEST, "Registration number must not be empty."));
    }
    if !is_valid_registration(&req.registration_number) {
        return Ok(reply_error(StatusCode::BAD_REQUEST, REGISTRATION_FORMAT_MSG));
    }
    if req.color.is_empty() {
        return Ok(reply_error(StatusCode::BAD_REQUEST, "Color must not be empty."));
    }
    let resp = match lot.park(req.registration_number.clone(), req.color.clone()).await {
        Ok(car) => {
            debug!("request succeeded -> {:?} : {:?}", req, car);
            reply_json(&car, StatusCode::CREATED)
        }
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_unpark(query: UnparkQuery, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let freed = if let Some(raw_slot) = query.slot_number {
        let slot_number = match raw_slot.trim().parse::<i64>() {
            Ok(slot) => slot,
            Err(_) => return Ok(reply_error(StatusCode::BAD_REQUEST, "Invalid slot number format.")),
        };
        match u32::try_from(slot_number) {
            Ok(slot_number) => lot.unpark_by_slot(slot_number).await,
            Err(_) => {
                let state = lot.current_state().await;
                if state.is_initialized {
                    Err(LotError::invalid_slot(slot_number, state.total_slots))
                } else {
                    Err(LotError::NotInitialized)
                }
            }
        }
    } else if let Some(registration_number) = query.registration_number {
        lot.unpark_by_registration(registration_number).await
    } else {
        return Ok(reply_error(StatusCode::BAD_REQUEST,
                              "Provide either slotNumber or registrationNumber to unpark."));
    };

    let resp = match freed {
        Ok(slot_number) => reply_json(&UnparkResponse {
            message: format!("Slot number {slot_number} is free."),
            freed_slot_number: slot_number,
        }, StatusCode::OK),
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_status(lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let resp = match lot.status().await {
        Ok(cars) => reply_json(&cars, StatusCode::OK),
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_registrations(query: ColorQuery, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let color = match query.color.filter(|c| !c.is_empty()) {
        Some(color) => color,
        None => return Ok(reply_error(StatusCode::BAD_REQUEST, "Query parameter \"color\" is required.")),
    };
    let resp = match lot.registrations_by_color(color).await {
        Ok(registrations) => reply_json(&registrations, StatusCode::OK),
        Err(e) => reply_lot_error(e),
    };
    Ok(resp)
}

async fn handle_slots(query: SlotsQuery, lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    let resp = if let Some(color) = query.color {
        match lot.slots_by_color(color).await {
            Ok(slots) => reply_json(&slots, StatusCode::OK),
            Err(e) => reply_lot_error(e),
        }
    } else if let Some(registration_number) = query.registration_number {
        match lot.slot_by_registration(registration_number).await {
            Ok(slot_number) => reply_json(&SlotResponse { slot_number }, StatusCode::OK),
            Err(e) => reply_lot_error(e),
        }
    } else {
        reply_error(StatusCode::BAD_REQUEST, "Provide either \"color\" or \"registrationNumber\" query parameter.")
    };
    Ok(resp)
}

async fn handle_internal_state(lot: Arc<ParkingLot>) -> Result<impl Reply, Rejection> {
    Ok(reply_json(&lot.current_state().await, StatusCode::OK))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a JSON body".to_string())
    } else {
        error!("unhandled rejection -> {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Request failed unexpectedly".to_string())
    };
    Ok(reply_error(status, &message))
}

fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract=(T, ), Error=Rejection> + Clone {
    warp::body::content_length_limit(1024 * 16).and(warp::body::json())
}

pub(crate) fn routes(lot: Arc<ParkingLot>) -> impl Filter<Extract=(impl Reply, ), Error=Infallible> + Clone {
    let lot_filter = warp::any().map(move || Arc::clone(&lot));

    // POST /parking-lots
    let route_create = warp::path!("parking-lots")
        .and(warp::post())
        .and(json_body::<CreateLotRequest>())
        .and(lot_filter.clone())
        .and_then(handle_create);

    // PATCH /parking-lots
    let route_expand = warp::path!("parking-lots")
        .and(warp::patch())
        .and(json_body::<ExpandLotRequest>())
        .and(lot_filter.clone())
        .and_then(handle_expand);

    let route_park = warp::path!("parking-lots" / "parkings")
        .and(warp::post())
        .and(json_body::<ParkRequest>())
        .and(lot_filter.clone())
        .and_then(handle_park);

    // DELETE /parking-lots/parkings?slotNumber=1 or ?registrationNumber=KA-01-HH-1234
    let route_unpark = warp::path!("parking-lots" / "parkings")
        .and(warp::delete())
        .and(warp::query::<UnparkQuery>())
        .and(lot_filter.clone())
        .and_then(handle_unpark);

    let route_status = warp::path!("parking-lots" / "status")
        .and(warp::get())
        .and(lot_filter.clone())
        .and_then(handle_status);

    let route_registrations = warp::path!("parking-lots" / "registrations")
        .and(warp::get())
        .and(warp::query::<ColorQuery>())
        .and(lot_filter.clone())
        .and_then(handle_registrations);

    let route_slots = warp::path!("parking-lots" / "slots")
        .and(warp::get())
        .and(warp::query::<SlotsQuery>())
        .and(lot_filter.clone())
        .and_then(handle_slots);

    let route_internal_state = warp::path!("parking-lots" / "internal-state")
        .and(warp::get())
        .and(lot_filter.clone())
        .and_then(handle_internal_state);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE"])
        .allow_headers(vec!["content-type"]);

    route_create
        .or(route_expand)
        .or(route_park)
        .or(route_unpark)
        .or(route_status)
        .or(route_registrations)
        .or(route_slots)
        .or(route_internal_state)
        .with(cors)
        .recover(handle_rejection)
}

#[tokio::main]
pub async fn run(config: Config) {
    let lot = Arc::new(ParkingLot::new());
    if let Some(capacity) = config.capacity {
        if let Err(e) = lot.create_lot(capacity).await {
            warn!("Could not pre-create lot of {capacity} slots: {e}");
        }
    }

    let (addr, server) = warp::serve(routes(lot))
        .bind_with_graceful_shutdown(([127, 0, 0, 1], config.port), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
        });
    info!("Starting server at {addr}");
    server.await;
    info!("Server stopped");
}
