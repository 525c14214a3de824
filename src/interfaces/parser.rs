// Parser for `ip addr` output
//
// Block format:
//   2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP qlen 1000
//       link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
//       inet 192.0.2.10/24 brd 192.0.2.255 scope global eth0
//       inet6 2001:db8::aabb:ccdd:eeff/64 scope global dynamic

use super::{AddressRecord, InterfaceRecord};
use crate::command::CommandRunner;
use crate::error::NetResult;
use crate::tool::{ADDRESSES_COMMAND, NetContext};

const ETHERNET_INTERFACE: &str = "link/ether";
const PPP_INTERFACE: &str = "link/ppp";
const TUN_INTERFACE: &str = "link/[65534]";
const USB_INTERFACE: &str = "link/[530]";

const INTERFACE_MTU: &str = "mtu";
const FLAG_UP: &str = "UP";

const ADDRESS_IPV4: &str = "inet";
const ADDRESS_IPV6: &str = "inet6";
const MODIFIER_SECONDARY: &str = "secondary";
const MODIFIER_TEMPORARY: &str = "temporary";
const MODIFIER_DEPRECATED: &str = "deprecated";

/// Query interface state, optionally for a single interface.
///
/// A failed query for a named interface yields one placeholder record that is
/// down, so callers can probe interfaces that may not exist yet. A failed full
/// listing is returned as an error; callers that only want best-effort state
/// use `unwrap_or_default()`.
pub async fn list_interfaces<R: CommandRunner>(
    ctx: &NetContext<R>,
    iface: Option<&str>,
) -> NetResult<Vec<InterfaceRecord>> {
    tracing::trace!("Acquiring interface details for {:?}", iface);

    let mut args = vec![ADDRESSES_COMMAND.to_string()];
    if let Some(name) = iface {
        args.extend(["show".to_string(), "dev".to_string(), name.to_string()]);
    }

    match ctx.runner().run_checked(&ctx.ip().invocation(args)).await {
        Ok(output) => Ok(parse_ip_addr(&output.stdout)),
        Err(e) => match iface {
            Some(name) => {
                tracing::warn!(
                    "Could not query interface {} ({}), most probably it doesn't exist at this time. Using a placeholder",
                    name,
                    e
                );
                Ok(vec![InterfaceRecord::placeholder(name)])
            }
            None => {
                tracing::warn!("Could not query status for all interfaces: {}", e);
                Err(e)
            }
        },
    }
}

/// Parse the complete output of `ip addr`
pub fn parse_ip_addr(output: &str) -> Vec<InterfaceRecord> {
    let mut interfaces = Vec::new();
    let mut current: Option<InterfaceRecord> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        tracing::trace!("parsing line '{}'", line);

        if !line.starts_with(char::is_whitespace) {
            flush(&mut interfaces, current.take());
            current = Some(parse_header(line));
        } else if let Some(record) = current.as_mut() {
            parse_continuation(record, line);
        }
    }

    flush(&mut interfaces, current);
    interfaces
}

fn flush(interfaces: &mut Vec<InterfaceRecord>, record: Option<InterfaceRecord>) {
    if let Some(record) = record {
        if record.is_retained() {
            tracing::trace!("adding to list: {}", record.name);
            interfaces.push(record);
        } else {
            tracing::trace!("dropping unsupported interface {}", record.name);
        }
    }
}

fn parse_header(line: &str) -> InterfaceRecord {
    // "<index>: <name>: <options>"
    let mut fields = line.splitn(3, ':');
    let _index = fields.next();
    let name = fields.next().unwrap_or_default().trim().to_string();
    let mut record = InterfaceRecord::placeholder(&name);

    let options: Vec<&str> = fields.next().unwrap_or_default().split_whitespace().collect();
    let mut i = 0;
    while i < options.len() {
        let opt = options[i];
        if opt == INTERFACE_MTU {
            if let Some(mtu) = options.get(i + 1) {
                match mtu.parse() {
                    Ok(mtu) => record.mtu = mtu,
                    Err(_) => tracing::debug!("Interface {} has unparseable mtu '{}'", name, mtu),
                }
                i += 1;
            }
        } else if let Some(flags) = opt.strip_prefix('<') {
            let flags = flags.strip_suffix('>').unwrap_or(flags);
            if flags.split(',').any(|flag| flag == FLAG_UP) {
                record.is_up = true;
            }
        }
        i += 1;
    }

    tracing::trace!("Read interface line: {}, {}, {}", record.name, record.mtu, record.is_up);
    record
}

fn parse_continuation(record: &mut InterfaceRecord, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut i = 0;

    while i < tokens.len() {
        let opt = tokens[i];

        // marker-only link types carry no value
        match opt {
            PPP_INTERFACE => record.is_ppp = true,
            TUN_INTERFACE | USB_INTERFACE => record.is_other = true,
            _ => {}
        }

        // "lo" ends the line, and so does a key without value
        if opt == "lo" || i + 1 >= tokens.len() {
            break;
        }
        let value = tokens[i + 1];
        i += 2;

        match opt {
            ETHERNET_INTERFACE => record.mac = Some(value.to_string()),
            ADDRESS_IPV4 | ADDRESS_IPV6 => match AddressRecord::parse(value) {
                Some(mut address) => {
                    address.secondary = line.contains(MODIFIER_SECONDARY);
                    address.temporary = line.contains(MODIFIER_TEMPORARY);
                    address.deprecated = line.contains(MODIFIER_DEPRECATED);
                    record.addresses.push(address);
                }
                None => tracing::debug!("Skipping unparseable address '{}' on {}", value, record.name),
            },
            _ => {}
        }
    }
}
