use std::{collections::BTreeMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{io::AsyncReadExt, net::UdpSocket};
use tracing::{info, warn};

use crate::demux::Demux;
use crate::monitor::{Input, Options};
use crate::network::create_udp_socket;
use crate::psi::{parse_pat, PatSection, SectionFilterSpec};
use crate::report::{PidCounters, Reporter};
use crate::types::{PesType, TsType};

const READ_CHUNK: usize = 188 * 7 * 64;

type PidMap = Arc<Mutex<BTreeMap<u16, PidCounters>>>;

struct Monitor {
    demux: Demux,
    pids: PidMap,
    pat: Arc<Mutex<Option<PatSection>>>,
}

impl Monitor {
    fn new(opts: &Options) -> anyhow::Result<Self> {
        let demux = Demux::software(opts.config.clone());
        if let Some((carrier_pid, isi)) = opts.bbframe {
            demux.set_bbframes_state(true, carrier_pid, isi)?;
        }
        let monitor = Self {
            demux,
            pids: PidMap::default(),
            pat: Arc::default(),
        };

        // PAT is always followed
        let pat = monitor.pat.clone();
        let pids = monitor.pids.clone();
        let feed = monitor.demux.allocate_section_feed(
            0x0000,
            opts.config.check_crc,
            Box::new(move |section, _filter, flags| {
                pids.lock().entry(0).or_default().record(section.len(), flags);
                match parse_pat(section) {
                    Ok(parsed) => *pat.lock() = Some(parsed),
                    Err(e) => warn!(error = %e, "undecodable PAT"),
                }
            }),
            None,
        )?;
        monitor
            .demux
            .allocate_section_filter(feed, &SectionFilterSpec::table_id(0x00))?;
        monitor.demux.start_filtering(feed)?;

        for &pid in &opts.section_pids {
            let pids = monitor.pids.clone();
            let feed = monitor.demux.allocate_section_feed(
                pid,
                opts.config.check_crc,
                Box::new(move |section, _filter, flags| {
                    pids.lock().entry(pid).or_default().record(section.len(), flags);
                }),
                None,
            )?;
            monitor
                .demux
                .allocate_section_filter(feed, &SectionFilterSpec::match_all())?;
            monitor.demux.start_filtering(feed)?;
        }

        for &pid in &opts.pids {
            let pids = monitor.pids.clone();
            let feed = monitor.demux.allocate_ts_feed(
                pid,
                TsType::PACKET | TsType::PAYLOAD_ONLY,
                PesType::Other,
                Box::new(move |payload, flags| {
                    pids.lock().entry(pid).or_default().record(payload.len(), flags);
                }),
                None,
            )?;
            monitor.demux.start_filtering(feed)?;
        }
        Ok(monitor)
    }

    fn report(&self) -> String {
        let mut sets = vec![self.demux.root()];
        let default = self.demux.default_feed_set();
        if default != sets[0] {
            sets.push(default);
        }
        let stats: Vec<_> = sets
            .into_iter()
            .filter_map(|s| self.demux.stats(s).ok())
            .collect();
        let pids = self.pids.lock();
        let pat = self.pat.lock();
        Reporter::generate_json_report(self.demux.census(), &stats, &pids, (*pat).as_ref())
    }
}

pub async fn run(opts: Options) -> anyhow::Result<()> {
    let monitor = Monitor::new(&opts)?;
    match &opts.input {
        Input::Udp(addr) => {
            let socket = create_udp_socket(*addr)?;
            let sock = UdpSocket::from_std(socket.into())?;
            info!(%addr, "listening");
            receive_udp(&monitor, &sock, &opts).await
        }
        Input::File(path) => {
            let mut file = tokio::fs::File::open(path).await?;
            info!(path = %path.display(), "reading capture");
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                monitor.demux.inject_unaligned(&buf[..n], opts.packet_size)?;
            }
            println!("{}", monitor.report());
            Ok(())
        }
    }
}

async fn receive_udp(monitor: &Monitor, sock: &UdpSocket, opts: &Options) -> anyhow::Result<()> {
    let mut buf = [0u8; 65536];
    let mut ticker = tokio::time::interval(Duration::from_secs(opts.refresh_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            recv = sock.recv(&mut buf) => {
                let n = recv?;
                if n == 0 {
                    continue;
                }
                monitor.demux.inject_unaligned(&buf[..n], opts.packet_size)?;
            }
            _ = ticker.tick() => {
                println!("{}", monitor.report());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                println!("{}", monitor.report());
                return Ok(());
            }
        }
    }
}
