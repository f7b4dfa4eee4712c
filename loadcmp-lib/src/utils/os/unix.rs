use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft limit of open file descriptors to `target`
/// (capped by the hard limit).
///
/// Every live worker keeps at least one socket open,
/// so large ramps run out of descriptors quickly with the default limit.
pub fn raise_nofile(target: rlim_t) -> std::io::Result<()> {
    use std::{io, mem};

    // SAFETY: rlimit is a plain C struct, get/setrlimit only read and write it.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let new_soft = target.min(lim.rlim_max);
        if lim.rlim_cur >= new_soft {
            tracing::debug!(
                current = lim.rlim_cur,
                requested = new_soft,
                "ulimit: current open file limit is sufficient",
            );
            return Ok(());
        }

        let previous = lim.rlim_cur;
        lim.rlim_cur = new_soft;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::info!(previous, current = new_soft, "ulimit: raised open file limit");
    }

    Ok(())
}
