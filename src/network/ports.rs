//! Port scanning: nmap invocation projected into findings with risk tags.

use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::models::PortFinding;
use crate::tools::nmap;

/// Scans one host and returns its open ports, risk-tagged. Closed and
/// filtered ports are dropped.
pub async fn scan_host_ports(
    bin: &str,
    host: &str,
    top_ports: usize,
    cancel: &CancellationToken,
) -> Result<Vec<PortFinding>, ToolError> {
    let run = nmap::scan_host(bin, host, top_ports, cancel).await?;
    Ok(findings_from_run(host, &run))
}

pub fn findings_from_run(host: &str, run: &nmap::NmapRun) -> Vec<PortFinding> {
    let mut findings = Vec::new();
    for scanned in &run.hosts {
        let ip = scanned
            .addresses
            .iter()
            .find(|a| a.addrtype == "ipv4" || a.addrtype == "ipv6")
            .map(|a| a.addr.clone())
            .unwrap_or_default();

        let Some(ports) = &scanned.ports else {
            continue;
        };
        for port in &ports.ports {
            if port.state.state != "open" {
                continue;
            }
            let service = port.service.as_ref();
            let service_name = service.map(|s| s.name.clone()).unwrap_or_default();
            findings.push(PortFinding {
                host: host.to_string(),
                ip: ip.clone(),
                port: port.portid,
                protocol: port.protocol.clone(),
                state: port.state.state.clone(),
                service: service_name.clone(),
                product: service.map(|s| s.product.clone()).unwrap_or_default(),
                version: service.map(|s| s.version.clone()).unwrap_or_default(),
                banner: service.map(|s| s.banner.clone()).unwrap_or_default(),
                risk_tags: classify_port_risk(port.portid, &service_name),
            });
        }
    }
    findings
}

/// Risk tags for a (port, service) pair. Port-keyed tags first, then
/// service-keyed tags for anything the port table missed.
pub fn classify_port_risk(port: u16, service: &str) -> Vec<String> {
    let mut tags: Vec<&str> = Vec::new();

    match port {
        21 => tags.extend(["ftp", "cleartext", "file-transfer"]),
        22 => tags.extend(["ssh", "remote-access"]),
        23 => tags.extend(["telnet", "cleartext", "remote-access", "high-risk"]),
        25 => tags.extend(["smtp", "email"]),
        53 => tags.push("dns"),
        80 => tags.extend(["http", "web"]),
        110 => tags.extend(["pop3", "email", "cleartext"]),
        143 => tags.extend(["imap", "email"]),
        443 => tags.extend(["https", "web", "encrypted"]),
        445 => tags.extend(["smb", "file-sharing", "windows"]),
        1433 => tags.extend(["mssql", "database"]),
        3306 => tags.extend(["mysql", "database"]),
        3389 => tags.extend(["rdp", "remote-access", "windows", "high-risk"]),
        5432 => tags.extend(["postgresql", "database"]),
        5900 | 5901 | 5902 => tags.extend(["vnc", "remote-access", "high-risk"]),
        6379 => tags.extend(["redis", "database"]),
        8080 | 8000 | 8888 => tags.extend(["http-alt", "web"]),
        27017 => tags.extend(["mongodb", "database"]),
        9200 | 9300 => tags.extend(["elasticsearch", "database"]),
        _ => {}
    }

    let mut add_if_new = |new_tags: &[&'static str], marker: &str| {
        if !tags.contains(&marker) {
            tags.extend(new_tags);
        }
    };
    match service {
        "ftp" => add_if_new(&["ftp", "file-transfer"], "ftp"),
        "ssh" => add_if_new(&["ssh", "remote-access"], "ssh"),
        "telnet" => add_if_new(&["telnet", "cleartext", "high-risk"], "telnet"),
        "mysql" => add_if_new(&["mysql", "database"], "mysql"),
        "postgresql" => add_if_new(&["postgresql", "database"], "postgresql"),
        "ms-sql-s" | "mssql" => add_if_new(&["mssql", "database"], "mssql"),
        "mongodb" => add_if_new(&["mongodb", "database"], "mongodb"),
        "redis" => add_if_new(&["redis", "database"], "redis"),
        "vnc" => add_if_new(&["vnc", "remote-access", "high-risk"], "vnc"),
        "rdp" | "ms-wbt-server" => {
            add_if_new(&["rdp", "remote-access", "windows", "high-risk"], "rdp")
        }
        _ => {}
    }

    tags.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_table_tags_known_ports() {
        assert_eq!(
            classify_port_risk(23, ""),
            vec!["telnet", "cleartext", "remote-access", "high-risk"]
        );
        assert_eq!(classify_port_risk(443, ""), vec!["https", "web", "encrypted"]);
        assert!(classify_port_risk(12345, "").is_empty());
    }

    #[test]
    fn service_table_covers_nonstandard_ports() {
        // MySQL on a non-default port still gets tagged via the service name.
        assert_eq!(classify_port_risk(13306, "mysql"), vec!["mysql", "database"]);
        assert_eq!(
            classify_port_risk(2222, "ssh"),
            vec!["ssh", "remote-access"]
        );
    }

    #[test]
    fn service_table_does_not_duplicate_port_tags() {
        let tags = classify_port_risk(22, "ssh");
        assert_eq!(tags, vec!["ssh", "remote-access"]);
    }

    #[test]
    fn only_open_ports_become_findings() {
        let xml = r#"<nmaprun>
  <host>
    <address addr="10.0.0.5" addrtype="ipv4"/>
    <ports>
      <port protocol="tcp" portid="22"><state state="open"/><service name="ssh"/></port>
      <port protocol="tcp" portid="80"><state state="closed"/></port>
      <port protocol="tcp" portid="443"><state state="filtered"/></port>
    </ports>
  </host>
</nmaprun>"#;
        let run = crate::tools::nmap::parse_xml(xml).unwrap();
        let findings = findings_from_run("a.example.com", &run);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].host, "a.example.com");
        assert_eq!(findings[0].ip, "10.0.0.5");
        assert_eq!(findings[0].port, 22);
        assert_eq!(findings[0].state, "open");
        assert_eq!(findings[0].risk_tags, vec!["ssh", "remote-access"]);
    }
}
