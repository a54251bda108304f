use std::time::Duration;

use thiserror::Error;
use tokio::{process::Command, time::timeout};

use crate::{Events, GraphChange, HubEvent};

/// How long a jack command line tool may run before the call is abandoned
const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// A point-in-time reading of the audio kernel's port graph.
///
/// The graph is owned by JACK itself; this snapshot is advisory and may lag
/// behind concurrent routing changes.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub clients: Vec<GraphClient>,
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    pub name: String,
    pub ports: Vec<GraphPort>,
}

#[derive(Debug, Clone)]
pub struct GraphPort {
    /// Fully qualified port name, `client:port`
    pub name: String,
    pub direction: PortDirection,
    pub kind: PortKind,
    /// Fully qualified names of the ports this one is wired to
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Output,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Midi,
}

#[derive(Debug, Error)]
pub enum JackError {
    #[error("Unknown port {0}")]
    InvalidPort(String),
    #[error("{source_port} -> {dest} is not an output to input pair")]
    IncompatibleDirection { source_port: String, dest: String },
    #[error("Ports are already connected")]
    AlreadyConnected,
    #[error("Ports are not connected")]
    NotConnected,
    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl GraphSnapshot {
    pub fn port(&self, name: &str) -> Option<&GraphPort> {
        self.clients
            .iter()
            .flat_map(|c| c.ports.iter())
            .find(|p| p.name == name)
    }

    /// Every edge of the graph, reported once, from the output side.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();

        for client in &self.clients {
            for port in &client.ports {
                if port.direction == PortDirection::Output {
                    for dest in &port.connections {
                        edges.push((port.name.clone(), dest.clone()));
                    }
                }
            }
        }

        edges
    }
}

/// The adapter between the hub and the local JACK server.
///
/// Reads go through `jack_lsp`, mutations through `jack_connect` and
/// `jack_disconnect`. The adapter holds no graph state of its own; JACK
/// serializes the actual routing changes.
pub struct JackPatchbay {
    events: Events,
}

impl JackPatchbay {
    pub fn new(events: Events) -> Self {
        Self { events }
    }

    /// Reads the current port graph from the audio kernel.
    pub async fn snapshot(&self) -> Result<GraphSnapshot, JackError> {
        let stdout = run_tool("jack_lsp", &["-c", "-p"]).await?;
        Ok(parse_graph(&stdout))
    }

    /// Wires an output port to an input port.
    ///
    /// The pair is validated against a fresh snapshot first, so expected
    /// failures surface as typed errors instead of tool stderr.
    pub async fn connect(&self, source: &str, dest: &str) -> Result<(), JackError> {
        let snapshot = self.snapshot().await?;
        validate_connect(&snapshot, source, dest)?;

        run_tool("jack_connect", &[source, dest]).await?;

        self.events.emit(HubEvent::GraphChanged {
            change: GraphChange::Connected {
                source: source.to_string(),
                dest: dest.to_string(),
            },
        });

        Ok(())
    }

    /// Removes the edge between two ports.
    pub async fn disconnect(&self, source: &str, dest: &str) -> Result<(), JackError> {
        let snapshot = self.snapshot().await?;
        validate_disconnect(&snapshot, source, dest)?;

        run_tool("jack_disconnect", &[source, dest]).await?;

        self.events.emit(HubEvent::GraphChanged {
            change: GraphChange::Disconnected {
                source: source.to_string(),
                dest: dest.to_string(),
            },
        });

        Ok(())
    }
}

async fn run_tool(tool: &'static str, args: &[&str]) -> Result<String, JackError> {
    let result = timeout(TOOL_TIMEOUT, Command::new(tool).args(args).output())
        .await
        .map_err(|_| JackError::Timeout(tool))?;

    let output = result.map_err(|e| JackError::Tool {
        tool,
        message: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(JackError::Tool {
            tool,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

struct RawPort {
    name: String,
    connections: Vec<String>,
    /// Direction as reported by the port's properties line, if any
    reported: Option<PortDirection>,
}

/// Parses `jack_lsp -c -p` output.
///
/// Unindented lines are port names; indented lines belong to the port above
/// them and are either connections or a `properties:` report.
pub fn parse_graph(stdout: &str) -> GraphSnapshot {
    let mut raw_ports: Vec<RawPort> = Vec::new();

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            let Some(port) = raw_ports.last_mut() else {
                continue;
            };

            let detail = line.trim();

            if let Some(properties) = detail.strip_prefix("properties:") {
                port.reported = direction_from_properties(properties);
            } else {
                port.connections.push(detail.to_string());
            }
        } else {
            raw_ports.push(RawPort {
                name: line.trim().to_string(),
                connections: Vec::new(),
                reported: None,
            });
        }
    }

    let mut snapshot = GraphSnapshot::default();

    for raw in raw_ports {
        let client_name = raw.name.split(':').next().unwrap_or(&raw.name).to_string();

        // jack_lsp also prints port type descriptions that look like clients
        if is_metadata_pseudo_client(&client_name) {
            continue;
        }

        let port = GraphPort {
            direction: raw
                .reported
                .unwrap_or_else(|| infer_direction(&raw.name, &raw.connections)),
            kind: infer_kind(&raw.name),
            name: raw.name,
            connections: raw.connections,
        };

        match snapshot.clients.iter_mut().find(|c| c.name == client_name) {
            Some(client) => {
                if !client.ports.iter().any(|p| p.name == port.name) {
                    client.ports.push(port);
                }
            }
            None => snapshot.clients.push(GraphClient {
                name: client_name,
                ports: vec![port],
            }),
        }
    }

    snapshot
}

fn is_metadata_pseudo_client(client_name: &str) -> bool {
    let lower = client_name.to_lowercase();
    lower.contains("bit") && (lower.contains("float") || lower.contains("raw"))
}

/// The `properties:` line is authoritative: jacktrip's send ports, for
/// example, are inputs despite what their name suggests.
fn direction_from_properties(properties: &str) -> Option<PortDirection> {
    for property in properties.split(',') {
        match property.trim() {
            "output" => return Some(PortDirection::Output),
            "input" => return Some(PortDirection::Input),
            _ => {}
        }
    }

    None
}

/// Name-based fallback for kernels whose `jack_lsp` does not report
/// properties. JACK semantics: capture ports produce audio (outputs of the
/// system client), playback ports consume it (inputs of the system client).
fn infer_direction(full_name: &str, connections: &[String]) -> PortDirection {
    let port_name = full_name
        .split_once(':')
        .map(|(_, p)| p)
        .unwrap_or(full_name)
        .to_lowercase();

    const OUTPUT_HINTS: [&str; 4] = ["send", "capture", "output", "out"];
    const INPUT_HINTS: [&str; 4] = ["receive", "playback", "input", "in"];

    if OUTPUT_HINTS.iter().any(|kw| port_name.contains(kw)) {
        PortDirection::Output
    } else if INPUT_HINTS.iter().any(|kw| port_name.contains(kw)) {
        PortDirection::Input
    } else if connections.is_empty() {
        PortDirection::Input
    } else {
        PortDirection::Output
    }
}

fn infer_kind(full_name: &str) -> PortKind {
    if full_name.to_lowercase().contains("midi") {
        PortKind::Midi
    } else {
        PortKind::Audio
    }
}

/// Checks that `source -> dest` is a legal new edge.
pub fn validate_connect(
    snapshot: &GraphSnapshot,
    source: &str,
    dest: &str,
) -> Result<(), JackError> {
    let src = snapshot
        .port(source)
        .ok_or_else(|| JackError::InvalidPort(source.to_string()))?;
    let dst = snapshot
        .port(dest)
        .ok_or_else(|| JackError::InvalidPort(dest.to_string()))?;

    if src.direction != PortDirection::Output || dst.direction != PortDirection::Input {
        return Err(JackError::IncompatibleDirection {
            source_port: source.to_string(),
            dest: dest.to_string(),
        });
    }

    if src.connections.iter().any(|c| c == dest) {
        return Err(JackError::AlreadyConnected);
    }

    Ok(())
}

/// Checks that the edge `source -> dest` exists before removal.
pub fn validate_disconnect(
    snapshot: &GraphSnapshot,
    source: &str,
    dest: &str,
) -> Result<(), JackError> {
    let src = snapshot
        .port(source)
        .ok_or_else(|| JackError::InvalidPort(source.to_string()))?;
    snapshot
        .port(dest)
        .ok_or_else(|| JackError::InvalidPort(dest.to_string()))?;

    if !src.connections.iter().any(|c| c == dest) {
        return Err(JackError::NotConnected);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured from a hub with one room ("jam-1") and a system device.
    // The local capture_1 feeds the room's send_1; note that jacktrip's
    // send ports report as inputs despite their name.
    const FIXTURE: &str = "\
system:capture_1
   jam-1:send_1
	properties: output,physical,terminal,
system:capture_2
	properties: output,physical,terminal,
system:playback_1
	properties: input,physical,terminal,
system:playback_2
	properties: input,physical,terminal,
system:midi_capture_1
	properties: output,physical,terminal,
jam-1:send_1
   system:capture_1
	properties: input,
jam-1:receive_1
	properties: output,
32 bit float mono audio:
";

    #[test]
    fn parses_clients_and_ports() {
        let graph = parse_graph(FIXTURE);

        let names: Vec<_> = graph.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["system", "jam-1"]);

        let system = &graph.clients[0];
        assert_eq!(system.ports.len(), 5);
        assert_eq!(system.ports[0].name, "system:capture_1");
        assert_eq!(system.ports[0].connections, vec!["jam-1:send_1"]);
        assert!(graph.port("system:playback_1").unwrap().connections.is_empty());
    }

    #[test]
    fn filters_metadata_pseudo_clients() {
        let graph = parse_graph(FIXTURE);

        assert!(!graph
            .clients
            .iter()
            .any(|c| c.name.contains("bit float")));
    }

    #[test]
    fn reported_properties_decide_directions() {
        let graph = parse_graph(FIXTURE);

        assert_eq!(
            graph.port("system:capture_1").unwrap().direction,
            PortDirection::Output
        );
        assert_eq!(
            graph.port("system:playback_1").unwrap().direction,
            PortDirection::Input
        );
        // The properties line overrules what the port names suggest
        assert_eq!(
            graph.port("jam-1:send_1").unwrap().direction,
            PortDirection::Input
        );
        assert_eq!(
            graph.port("jam-1:receive_1").unwrap().direction,
            PortDirection::Output
        );
    }

    #[test]
    fn port_names_decide_directions_without_properties() {
        assert_eq!(infer_direction("x:capture_1", &[]), PortDirection::Output);
        assert_eq!(infer_direction("x:send_2", &[]), PortDirection::Output);
        assert_eq!(infer_direction("x:playback_1", &[]), PortDirection::Input);
        assert_eq!(infer_direction("x:receive_2", &[]), PortDirection::Input);
    }

    #[test]
    fn infers_midi_ports() {
        let graph = parse_graph(FIXTURE);

        assert_eq!(
            graph.port("system:midi_capture_1").unwrap().kind,
            PortKind::Midi
        );
        assert_eq!(graph.port("system:capture_1").unwrap().kind, PortKind::Audio);
    }

    #[test]
    fn edges_are_reported_from_the_output_side_only() {
        let graph = parse_graph(FIXTURE);
        let edges = graph.edges();

        assert_eq!(
            edges,
            vec![("system:capture_1".to_string(), "jam-1:send_1".to_string())]
        );
    }

    #[test]
    fn connect_requires_known_ports() {
        let graph = parse_graph(FIXTURE);

        let result = validate_connect(&graph, "nope:out", "system:playback_1");
        assert!(matches!(result, Err(JackError::InvalidPort(p)) if p == "nope:out"));
    }

    #[test]
    fn connect_requires_output_to_input() {
        let graph = parse_graph(FIXTURE);

        let result = validate_connect(&graph, "system:playback_1", "system:playback_2");
        assert!(matches!(
            result,
            Err(JackError::IncompatibleDirection { .. })
        ));

        assert!(validate_connect(&graph, "system:capture_2", "system:playback_1").is_ok());
    }

    #[test]
    fn connect_rejects_existing_edge() {
        let graph = parse_graph(FIXTURE);

        let result = validate_connect(&graph, "system:capture_1", "jam-1:send_1");
        assert!(matches!(result, Err(JackError::AlreadyConnected)));
    }

    #[test]
    fn connect_accepts_room_send_ports_as_destinations() {
        let graph = parse_graph(FIXTURE);

        assert!(validate_connect(&graph, "system:capture_2", "jam-1:send_1").is_ok());
    }

    #[test]
    fn disconnect_requires_an_existing_edge() {
        let graph = parse_graph(FIXTURE);

        assert!(validate_disconnect(&graph, "system:capture_1", "jam-1:send_1").is_ok());

        let result = validate_disconnect(&graph, "system:capture_2", "system:playback_1");
        assert!(matches!(result, Err(JackError::NotConnected)));
    }
}
