//! Raw HCI socket backend.
//!
//! Scans without the BlueZ daemon by talking to the controller over a raw
//! Linux HCI socket. Requires CAP_NET_RAW and CAP_NET_ADMIN or root.
//! Unlike the D-Bus backend this one sees the advertisement record exactly as
//! it was received.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::advertisement::RawAdvertisement;
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use log::{debug, trace};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;
const HCI_DEV_ID: u16 = 0;

const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

/// Passive scan, 10 ms interval and window (0.625 ms units), public own
/// address, accept all advertisers.
const SCAN_PARAMETERS: [u8; 7] = [0x00, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00];
/// Enable scanning without duplicate filtering.
const SCAN_ENABLE: [u8; 2] = [0x01, 0x00];

/// Largest HCI event: packet type, event code, length and 255 bytes of parameters.
const MAX_EVENT_SIZE: usize = 258;

#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// Kernel-side filter of which packets a raw socket receives.
#[repr(C)]
#[derive(Default)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn le_meta_events() -> Self {
        let mut filter = Self::default();
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

fn os_error(context: &str) -> ScanError {
    ScanError::Bluetooth(format!("{context}: {}", io::Error::last_os_error()))
}

/// A raw HCI socket bound to one controller.
struct HciSocket(OwnedFd);

impl HciSocket {
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK is required for AsyncFd
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        if fd < 0 {
            return Err(os_error("Failed to create HCI socket"));
        }
        let socket = Self(unsafe { OwnedFd::from_raw_fd(fd) });

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                socket.0.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to bind HCI socket"));
        }

        Ok(socket)
    }

    fn set_filter(&self, filter: &HciFilter) -> Result<(), ScanError> {
        let ret = unsafe {
            libc::setsockopt(
                self.0.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to set HCI filter"));
        }
        Ok(())
    }

    fn send_command(&self, ogf: u16, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = command_packet(ogf, ocf, params);
        let ret = unsafe {
            libc::write(
                self.0.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        if ret < 0 {
            return Err(os_error("Failed to send HCI command"));
        }
        Ok(())
    }
}

/// Encode an HCI command packet.
fn command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Parse the first report of an LE Advertising Report event.
///
/// `packet` is the whole event including the packet type byte. Layout after
/// the 4 byte header (type, event code, length, subevent): report count,
/// event type, address type, address (6, little-endian), data length, data.
fn parse_advertising_report(packet: &[u8]) -> Option<RawAdvertisement> {
    let [HCI_EVENT_PKT, EVT_LE_META_EVENT, _, EVT_LE_ADVERTISING_REPORT, report @ ..] = packet
    else {
        return None;
    };
    let [count, _event_type, _addr_type, a0, a1, a2, a3, a4, a5, data_len, rest @ ..] = report
    else {
        return None;
    };
    if *count == 0 {
        return None;
    }

    let record = rest.get(..usize::from(*data_len))?;
    let mac = MacAddress::from_hci_bytes(&[*a0, *a1, *a2, *a3, *a4, *a5]);
    Some(RawAdvertisement::from_scan_record(mac, record))
}

/// Start scanning on `hci0`.
///
/// One socket receives LE meta events, a second one sends the scan
/// configuration commands.
pub async fn start_scan() -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let events = HciSocket::open(HCI_DEV_ID)?;
    events.set_filter(&HciFilter::le_meta_events())?;

    let commands = HciSocket::open(HCI_DEV_ID)?;
    commands.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, &SCAN_PARAMETERS)?;
    commands.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &SCAN_ENABLE)?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
    let async_fd = AsyncFd::new(events.0)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {}", e)))?;

    tokio::spawn(async move {
        let _commands = commands;
        let mut buf = [0u8; MAX_EVENT_SIZE];

        'outer: loop {
            let Ok(mut guard) = async_fd.readable().await else {
                break;
            };

            // Drain all available packets before waiting again
            loop {
                let read = guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                });
                let n = match read {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        debug!("HCI read failed: {e}");
                        break;
                    }
                    Err(_would_block) => break,
                };

                match parse_advertising_report(&buf[..n]) {
                    Some(raw) => {
                        if tx.send(raw).await.is_err() {
                            debug!("Advertisement receiver dropped, stopping scan");
                            break 'outer;
                        }
                    }
                    None => trace!("Skipped HCI event of {n} bytes"),
                }
            }
        }
    });

    Ok(rx)
}
