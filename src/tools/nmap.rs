//! TCP port scanning via `nmap`.

use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::run_command;
use crate::config::NMAP_TIMEOUT;
use crate::error::ToolError;

// `nmap -oX -` document, projected down to what the port scanner needs.

#[derive(Debug, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(default, rename = "host")]
    pub hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
pub struct NmapHost {
    #[serde(default, rename = "address")]
    pub addresses: Vec<NmapAddress>,
    #[serde(default)]
    pub ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
pub struct NmapAddress {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addrtype: String,
}

#[derive(Debug, Deserialize)]
pub struct NmapPorts {
    #[serde(default, rename = "port")]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub portid: u16,
    pub state: NmapState,
    #[serde(default)]
    pub service: Option<NmapService>,
}

#[derive(Debug, Deserialize)]
pub struct NmapState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NmapService {
    #[serde(default, rename = "@name")]
    pub name: String,
    #[serde(default, rename = "@product")]
    pub product: String,
    #[serde(default, rename = "@version")]
    pub version: String,
    #[serde(default, rename = "@extrainfo")]
    pub banner: String,
}

/// Runs a TCP connect scan with service detection against one host and
/// returns the parsed XML document.
pub async fn scan_host(
    bin: &str,
    host: &str,
    top_ports: usize,
    cancel: &CancellationToken,
) -> Result<NmapRun, ToolError> {
    let mut cmd = Command::new(bin);
    cmd.arg("-sT")
        .arg("-sV")
        .arg(format!("--top-ports={top_ports}"))
        .arg("-oX")
        .arg("-")
        .arg("--host-timeout")
        .arg("5m")
        .arg("--max-retries")
        .arg("1")
        .arg("--version-intensity")
        .arg("2")
        .arg(host);

    let out = run_command("nmap", cmd, NMAP_TIMEOUT, cancel).await?;
    parse_xml(&out.stdout)
}

pub fn parse_xml(xml: &str) -> Result<NmapRun, ToolError> {
    quick_xml::de::from_str(xml).map_err(|e| ToolError::Failed {
        tool: "nmap",
        stderr: format!("xml parse failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sT -sV">
  <host>
    <address addr="93.184.216.34" addrtype="ipv4"/>
    <address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
    <ports>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack"/>
        <service name="ssh" product="OpenSSH" version="8.9p1" extrainfo="Ubuntu Linux"/>
      </port>
      <port protocol="tcp" portid="80">
        <state state="open"/>
        <service name="http" product="nginx"/>
      </port>
      <port protocol="tcp" portid="443">
        <state state="filtered"/>
      </port>
    </ports>
  </host>
</nmaprun>"#;

    #[test]
    fn parses_hosts_ports_and_services() {
        let run = parse_xml(SAMPLE).unwrap();
        assert_eq!(run.hosts.len(), 1);
        let host = &run.hosts[0];
        assert_eq!(host.addresses[0].addr, "93.184.216.34");
        assert_eq!(host.addresses[0].addrtype, "ipv4");

        let ports = &host.ports.as_ref().unwrap().ports;
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].portid, 22);
        assert_eq!(ports[0].state.state, "open");
        let svc = ports[0].service.as_ref().unwrap();
        assert_eq!(svc.name, "ssh");
        assert_eq!(svc.product, "OpenSSH");
        assert_eq!(svc.version, "8.9p1");
        assert_eq!(svc.banner, "Ubuntu Linux");
        assert_eq!(ports[2].state.state, "filtered");
    }

    #[test]
    fn tolerates_host_without_ports() {
        let xml = r#"<nmaprun><host><address addr="10.0.0.1" addrtype="ipv4"/></host></nmaprun>"#;
        let run = parse_xml(xml).unwrap();
        assert!(run.hosts[0].ports.is_none());
    }

    #[test]
    fn malformed_xml_is_a_tool_failure() {
        let err = parse_xml("<nmaprun><host>").unwrap_err();
        assert!(matches!(err, ToolError::Failed { tool: "nmap", .. }));
    }
}
