//! A blocking client for SUMO's TraCI remote-control protocol, and a
//! launcher that starts SUMO as a child process and connects to it.
//!
//! Only the commands needed to drive the environment are implemented.

use self::constants::*;
use self::storage::{Reader, Storage};
use crate::config::SimulatorConfig;
use crate::math::Point2d;
use crate::simulator::{Launcher, Simulator};
use crate::{Error, Result};
use log::{debug, warn};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

pub mod constants;
pub mod storage;

/// A connection to a TraCI server.
pub struct TraciClient {
    stream: TcpStream,
    /// The simulator process, if this client launched it.
    process: Option<Child>,
    /// Whether the close command has been sent.
    closed: bool,
}

impl TraciClient {
    /// Connects to a TraCI server which is already listening.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            process: None,
            closed: false,
        })
    }

    /// Takes ownership of the simulator process, which is reaped when the client closes.
    fn with_process(mut self, process: Child) -> Self {
        self.process = Some(process);
        self
    }

    /// Queries the TraCI API version and the simulator's version string.
    pub fn version(&mut self) -> Result<(i32, String)> {
        let response = self.execute(CMD_GETVERSION, &[])?;
        let mut reader = Reader::new(&response);
        let (id, _) = reader.read_command_header()?;
        if id != CMD_GETVERSION {
            return Err(Error::Protocol(format!(
                "expected version response, got command 0x{:02x}",
                id
            )));
        }
        Ok((reader.read_i32()?, reader.read_string()?))
    }

    /// Sends a message and returns the body of the reply, without its length prefix.
    fn exchange(&mut self, message: &[u8]) -> Result<Vec<u8>> {
        self.stream.write_all(message)?;
        self.stream.flush()?;

        let mut header = [0; 4];
        self.stream.read_exact(&mut header)?;
        let len = i32::from_be_bytes(header);
        let body_len = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_sub(header.len()))
            .ok_or_else(|| Error::Protocol(format!("invalid message length {}", len)))?;

        let mut body = vec![0; body_len];
        self.stream.read_exact(&mut body)?;
        Ok(body)
    }

    /// Executes a single command and checks its status.
    /// Returns whatever follows the status in the reply.
    fn execute(&mut self, id: u8, content: &[u8]) -> Result<Vec<u8>> {
        let mut commands = Storage::new();
        commands.write_command(id, content);
        let response = self.exchange(&commands.into_message())?;

        let mut reader = Reader::new(&response);
        let (status_id, _) = reader.read_command_header()?;
        let result = reader.read_u8()?;
        let description = reader.read_string()?;
        if status_id != id {
            return Err(Error::Protocol(format!(
                "expected status of command 0x{:02x}, got 0x{:02x}",
                id, status_id
            )));
        }
        match result {
            RTYPE_OK => Ok(reader.rest().to_vec()),
            RTYPE_NOTIMPLEMENTED => Err(Error::Simulator {
                command: id,
                message: format!("not implemented: {}", description),
            }),
            _ => Err(Error::Simulator {
                command: id,
                message: description,
            }),
        }
    }

    /// Retrieves a variable of an object and decodes it with `read`.
    fn get<T>(
        &mut self,
        command: u8,
        variable: u8,
        object_id: &str,
        read: impl FnOnce(&mut Reader) -> Result<T>,
    ) -> Result<T> {
        let mut content = Storage::new();
        content.write_u8(variable);
        content.write_string(object_id);
        let response = self.execute(command, content.as_bytes())?;

        let mut reader = Reader::new(&response);
        let (id, _) = reader.read_command_header()?;
        let response_var = reader.read_u8()?;
        let _object_id = reader.read_string()?;
        if id != command + RESPONSE_OFFSET || response_var != variable {
            return Err(Error::Protocol(format!(
                "expected variable 0x{:02x} of command 0x{:02x}, got 0x{:02x} of 0x{:02x}",
                variable, command, response_var, id
            )));
        }
        read(&mut reader)
    }

    /// Sets a variable of a vehicle. `write_value` must write the type tag and the value.
    fn set_vehicle(
        &mut self,
        variable: u8,
        vehicle_id: &str,
        write_value: impl FnOnce(&mut Storage),
    ) -> Result<()> {
        let mut content = Storage::new();
        content.write_u8(variable);
        content.write_string(vehicle_id);
        write_value(&mut content);
        self.execute(CMD_SET_VEHICLE_VARIABLE, content.as_bytes())?;
        Ok(())
    }

    /// Waits for the simulator process to exit, if this client owns it.
    fn reap(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            let status = process.wait()?;
            debug!("Simulator process exited with {}.", status);
        }
        Ok(())
    }
}

impl Simulator for TraciClient {
    fn vehicle_ids(&mut self) -> Result<Vec<String>> {
        self.get(CMD_GET_VEHICLE_VARIABLE, TRACI_ID_LIST, "", |r| {
            r.read_typed_string_list()
        })
    }

    fn position(&mut self, vehicle_id: &str) -> Result<Point2d> {
        self.get(CMD_GET_VEHICLE_VARIABLE, VAR_POSITION, vehicle_id, |r| {
            r.read_typed_position()
        })
    }

    fn speed(&mut self, vehicle_id: &str) -> Result<f64> {
        self.get(CMD_GET_VEHICLE_VARIABLE, VAR_SPEED, vehicle_id, |r| {
            r.read_typed_f64()
        })
    }

    fn set_speed(&mut self, vehicle_id: &str, speed: f64) -> Result<()> {
        self.set_vehicle(VAR_SPEED, vehicle_id, |s| {
            s.write_u8(TYPE_DOUBLE);
            s.write_f64(speed);
        })
    }

    fn set_speed_mode(&mut self, vehicle_id: &str, mode: i32) -> Result<()> {
        self.set_vehicle(VAR_SPEEDSETMODE, vehicle_id, |s| {
            s.write_u8(TYPE_INTEGER);
            s.write_i32(mode);
        })
    }

    fn simulation_step(&mut self) -> Result<()> {
        // A target time of zero advances exactly one step
        let mut content = Storage::new();
        content.write_f64(0.0);
        let response = self.execute(CMD_SIMSTEP, content.as_bytes())?;
        // Followed by subscription results, of which there are none
        let subscriptions = Reader::new(&response).read_i32()?;
        if subscriptions != 0 {
            warn!("Ignoring {} unexpected subscription results.", subscriptions);
        }
        Ok(())
    }

    fn colliding_vehicle_ids(&mut self) -> Result<Vec<String>> {
        self.get(CMD_GET_SIM_VARIABLE, VAR_COLLIDING_VEHICLES_IDS, "", |r| {
            r.read_typed_string_list()
        })
    }

    fn min_expected_number(&mut self) -> Result<i32> {
        self.get(CMD_GET_SIM_VARIABLE, VAR_MIN_EXPECTED_VEHICLES, "", |r| {
            r.read_typed_i32()
        })
    }

    fn load(&mut self, args: &[String]) -> Result<()> {
        let mut content = Storage::new();
        content.write_u8(TYPE_STRINGLIST);
        content.write_string_list(args);
        self.execute(CMD_LOAD, content.as_bytes())?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.execute(CMD_CLOSE, &[])?;
            // The server may already have hung up
            let _ = self.stream.shutdown(Shutdown::Both);
        }
        self.reap()
    }
}

impl Drop for TraciClient {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                debug!("Could not close TraCI connection cleanly: {}", err);
            }
        }
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

/// Starts SUMO as a child process and connects to it over TraCI.
#[derive(Clone, Debug, Default)]
pub struct SumoLauncher {
    config: SimulatorConfig,
}

impl SumoLauncher {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    /// The binary to run, honouring an explicitly configured one.
    fn binary(&self, gui: bool) -> PathBuf {
        match &self.config.binary {
            Some(binary) => binary.clone(),
            None => find_binary(if gui { "sumo-gui" } else { "sumo" }),
        }
    }
}

impl Launcher for SumoLauncher {
    type Sim = TraciClient;

    fn launch(&mut self, gui: bool, args: &[String]) -> Result<TraciClient> {
        let binary = self.binary(gui);
        let port = free_port()?;
        let mut process = Command::new(&binary)
            .args(args)
            .arg("--remote-port")
            .arg(port.to_string())
            .spawn()
            .map_err(|err| Error::Launch(format!("{}: {}", binary.display(), err)))?;
        debug!("Started {} listening on port {}.", binary.display(), port);

        // The simulator needs a moment before it accepts connections
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let delay = Duration::from_millis(self.config.connect_delay_ms);
        let mut attempts = 0;
        let client = loop {
            if let Some(status) = process.try_wait()? {
                return Err(Error::Launch(format!(
                    "{} exited with {} before accepting a connection",
                    binary.display(),
                    status
                )));
            }
            match TraciClient::connect(addr) {
                Ok(client) => break client,
                Err(_) if attempts < self.config.connect_retries => {
                    attempts += 1;
                    std::thread::sleep(delay);
                }
                Err(err) => {
                    let _ = process.kill();
                    let _ = process.wait();
                    return Err(Error::Launch(format!(
                        "could not connect to {} on port {}: {}",
                        binary.display(),
                        port,
                        err
                    )));
                }
            }
        };

        let mut client = client.with_process(process);
        let (api, version) = client.version()?;
        debug!("Connected to {} (TraCI API {}).", version, api);
        Ok(client)
    }
}

/// Locates a SUMO binary.
///
/// Checks `SUMO_BINARY` (or `GUISIM_BINARY` for `sumo-gui`), then
/// `$SUMO_HOME/bin`, and otherwise leaves the name to be resolved through `PATH`.
pub fn find_binary(name: &str) -> PathBuf {
    let var = match name {
        "sumo-gui" => "GUISIM_BINARY".to_string(),
        _ => format!("{}_BINARY", name.to_uppercase().replace('-', "_")),
    };
    if let Some(binary) = std::env::var_os(var).map(PathBuf::from) {
        if binary.is_file() {
            return binary;
        }
    }
    let file_name = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    if let Some(home) = std::env::var_os("SUMO_HOME") {
        let binary = PathBuf::from(home).join("bin").join(&file_name);
        if binary.is_file() {
            return binary;
        }
    }
    PathBuf::from(file_name)
}

/// Finds a local TCP port which is currently free.
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
