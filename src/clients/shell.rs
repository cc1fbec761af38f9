use std::str::FromStr;
use std::sync::Arc;
use log::{debug, info};
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use crate::clients::parking_client::{ParkingApi, ParkingClient};
use crate::config::Config;
use crate::core::allocator::ParkedCar;
use crate::errors::client_error::ClientError;
use crate::errors::command_error::CommandError;


#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    CreateLot(u32),
    ExpandLot(u32),
    Park { registration_number: String, color: String },
    LeaveSlot(u32),
    LeaveCar(String),
    Status,
    RegistrationsByColor(String),
    SlotsByColor(String),
    SlotByRegistration(String),
    State,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Print(String),
    Skip,
    Exit,
}

fn positive(arg: Option<&str>, usage: &'static str) -> Result<u32, CommandError> {
    arg.and_then(|a| a.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .ok_or(CommandError::Usage(usage))
}

fn word(arg: Option<&str>, usage: &'static str) -> Result<String, CommandError> {
    arg.map(str::to_string).ok_or(CommandError::Usage(usage))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let first = parts.next();
        let second = parts.next();
        let (command, usage) = match name {
            "create_parking_lot" => {
                let usage = "create_parking_lot <capacity>";
                (Command::CreateLot(positive(first, usage)?), usage)
            }
            "expand_parking_lot" => {
                let usage = "expand_parking_lot <slots>";
                (Command::ExpandLot(positive(first, usage)?), usage)
            }
            "park" => {
                let usage = "park <registration_number> <colour>";
                (Command::Park { registration_number: word(first, usage)?, color: word(second, usage)? }, usage)
            }
            "leave" => {
                let usage = "leave <slot_number>";
                (Command::LeaveSlot(positive(first, usage)?), usage)
            }
            "leave_car" => {
                let usage = "leave_car <registration_number>";
                (Command::LeaveCar(word(first, usage)?), usage)
            }
            "registration_numbers_for_cars_with_colour" => {
                let usage = "registration_numbers_for_cars_with_colour <colour>";
                (Command::RegistrationsByColor(word(first, usage)?), usage)
            }
            "slot_numbers_for_cars_with_colour" => {
                let usage = "slot_numbers_for_cars_with_colour <colour>";
                (Command::SlotsByColor(word(first, usage)?), usage)
            }
            "slot_number_for_registration_number" => {
                let usage = "slot_number_for_registration_number <registration_number>";
                (Command::SlotByRegistration(word(first, usage)?), usage)
            }
            "status" => (Command::Status, "status"),
            "state" => (Command::State, "state"),
            "exit" => (Command::Exit, "exit"),
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        let arity = match command {
            Command::Park { .. } => 2,
            Command::Status | Command::State | Command::Exit => 0,
            _ => 1,
        };
        let extra = [first, second].iter().skip(arity).any(Option::is_some) || parts.next().is_some();
        if extra {
            return Err(CommandError::Usage(usage));
        }
        Ok(command)
    }
}

fn render_status(cars: &[ParkedCar]) -> String {
    let mut out = format!("{:<12}{:<19}{}", "Slot No.", "Registration No", "Colour");
    for car in cars {
        out.push_str(&format!("\n{:<12}{:<19}{}", car.slot_number, car.registration_number, car.color));
    }
    out
}

fn join_or_not_found<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return "Not found".to_string();
    }
    items.iter().map(|i| i.to_string()).collect::<Vec<String>>().join(", ")
}

pub(crate) async fn execute<A: ParkingApi + ?Sized>(api: &A, command: Command) -> Result<String, ClientError> {
    let out = match command {
        Command::CreateLot(capacity) => {
            let resp = api.create_lot(capacity).await?;
            format!("Created a parking lot with {} slots", resp.capacity)
        }
        Command::ExpandLot(slots) => {
            let resp = api.expand_lot(slots).await?;
            format!("Expanded parking lot from {} to {} slots", resp.old_capacity, resp.new_capacity)
        }
        Command::Park { registration_number, color } => {
            let car = api.park(registration_number, color).await?;
            format!("Allocated slot number: {}", car.slot_number)
        }
        Command::LeaveSlot(slot_number) => {
            let resp = api.unpark_by_slot(slot_number).await?;
            format!("Slot number {} is free", resp.freed_slot_number)
        }
        Command::LeaveCar(registration_number) => {
            let resp = api.unpark_by_registration(registration_number).await?;
            format!("Slot number {} is free", resp.freed_slot_number)
        }
        Command::Status => render_status(&api.status().await?),
        Command::RegistrationsByColor(color) => join_or_not_found(&api.registrations_by_color(color).await?),
        Command::SlotsByColor(color) => join_or_not_found(&api.slots_by_color(color).await?),
        Command::SlotByRegistration(registration_number) => {
            match api.slot_by_registration(registration_number).await {
                Ok(slot_number) => slot_number.to_string(),
                Err(e) if e.status() == Some(404) => "Not found".to_string(),
                Err(e) => return Err(e),
            }
        }
        Command::State => {
            let state = api.current_state().await?;
            format!("total: {}, occupied: {}, available: {}, initialized: {}",
                    state.total_slots, state.occupied_count, state.available_count, state.is_initialized)
        }
        Command::Exit => String::new(),
    };
    Ok(out)
}

/// Runs one input line against the server. Failures are reported as text.
pub(crate) async fn interpret<A: ParkingApi + ?Sized>(api: &A, line: &str) -> Outcome {
    if line.trim().is_empty() {
        return Outcome::Skip;
    }
    let command = match line.parse::<Command>() {
        Ok(Command::Exit) => return Outcome::Exit,
        Ok(command) => command,
        Err(e) => return Outcome::Print(e.to_string()),
    };
    debug!("executing {:?}", command);
    match execute(api, command).await {
        Ok(out) => Outcome::Print(out),
        Err(ClientError::Api { message, .. }) => Outcome::Print(message),
        Err(e) => Outcome::Print(e.to_string()),
    }
}

#[tokio::main]
pub async fn run(config: Config) {
    let api = ParkingClient::new(Arc::new(Client::new()), config.server_url.clone());
    info!("Talking to parking server at {}", config.server_url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("stdin closed unexpectedly -> {:?}", e);
                break;
            }
        };
        match interpret(&api, &line).await {
            Outcome::Print(out) => println!("{out}"),
            Outcome::Skip => {}
            Outcome::Exit => break,
        }
    }
}
