//! A length-prefixed `serde_json` channel over a `SOCK_SEQPACKET`
//! socketpair, grounded in `libcontainer::process::channel`. Reduced to one
//! bidirectional pair instead of the teacher's three separate
//! main/intermediate/init channels, since this runtime only has a parent and
//! a single forked child to synchronise.
use std::io::{IoSlice, IoSliceMut};
use std::os::unix::io::RawFd;

use nix::sys::socket::{self, UnixAddr};
use nix::unistd;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ExecError;
use crate::process::message::Message;

pub struct Channel {
    fd: RawFd,
}

impl Channel {
    pub fn pair() -> Result<(Channel, Channel), ExecError> {
        let (a, b) = socket::socketpair(
            socket::AddressFamily::Unix,
            socket::SockType::SeqPacket,
            None,
            socket::SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|err| ExecError::Channel(format!("socketpair: {err}")))?;
        Ok((Channel { fd: a }, Channel { fd: b }))
    }

    pub fn send(&self, msg: &Message) -> Result<(), ExecError> {
        send(self.fd, msg)
    }

    pub fn recv(&self) -> Result<Message, ExecError> {
        recv(self.fd)
    }

    pub fn close(self) -> Result<(), ExecError> {
        let fd = self.fd;
        std::mem::forget(self);
        unistd::close(fd).map_err(|err| ExecError::Channel(format!("close: {err}")))
    }

    /// Blocks for the child's final word after it has been released with
    /// `Proceed`: a reported `Failed` reason, or (since the socket is
    /// `CLOEXEC`) a closed channel once the child successfully replaces
    /// itself via exec. `spec.md` §4.4 step 6 requires any failure before
    /// the exec handoff to be reported over this channel, so a clean close
    /// is the success signal, not an error.
    pub fn wait_for_completion(&self) -> Result<(), ExecError> {
        match self.recv() {
            Ok(Message::Failed(reason)) => Err(ExecError::ChildFailed(reason)),
            Ok(other) => Err(ExecError::Channel(format!(
                "unexpected message after releasing child: {other}"
            ))),
            Err(ExecError::Channel(msg)) if msg.contains("closed") => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = unistd::close(self.fd);
    }
}

fn send<T: Serialize>(fd: RawFd, value: &T) -> Result<(), ExecError> {
    let payload = serde_json::to_vec(value)
        .map_err(|err| ExecError::Channel(format!("serialize: {err}")))?;
    let len = payload.len() as u64;
    let iov = [
        IoSlice::new(&len.to_ne_bytes()),
        IoSlice::new(&payload),
    ];
    socket::sendmsg::<UnixAddr>(fd, &iov, &[], socket::MsgFlags::empty(), None)
        .map_err(|err| ExecError::Channel(format!("sendmsg: {err}")))?;
    Ok(())
}

fn recv<T: DeserializeOwned>(fd: RawFd) -> Result<T, ExecError> {
    let mut len_buf = [0u8; 8];
    let len: u64;
    {
        let mut iov = [IoSliceMut::new(&mut len_buf)];
        let msg = socket::recvmsg::<UnixAddr>(fd, &mut iov, None, socket::MsgFlags::MSG_PEEK)
            .map_err(|err| ExecError::Channel(format!("recvmsg peek: {err}")))?;
        if msg.bytes == 0 {
            return Err(ExecError::Channel("channel closed unexpectedly".to_string()));
        }
        len = u64::from_ne_bytes(len_buf);
    }
    let mut buf = vec![0u8; len as usize];
    {
        let mut iov = [IoSliceMut::new(&mut len_buf), IoSliceMut::new(&mut buf)];
        let msg = socket::recvmsg::<UnixAddr>(fd, &mut iov, None, socket::MsgFlags::empty())
            .map_err(|err| ExecError::Channel(format!("recvmsg: {err}")))?;
        if msg.bytes == 0 {
            return Err(ExecError::Channel("channel closed unexpectedly".to_string()));
        }
    }
    serde_json::from_slice(&buf).map_err(|err| ExecError::Channel(format!("deserialize: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use serial_test::serial;

    #[test]
    #[serial]
    fn round_trips_proceed_across_a_fork() {
        let (parent_end, child_end) = Channel::pair().unwrap();
        match unsafe { fork().unwrap() } {
            ForkResult::Parent { child } => {
                drop(child_end);
                parent_end.send(&Message::Proceed).unwrap();
                match waitpid(child, None).unwrap() {
                    WaitStatus::Exited(_, code) => assert_eq!(code, 0),
                    other => panic!("unexpected wait status: {other:?}"),
                }
            }
            ForkResult::Child => {
                drop(parent_end);
                let msg = child_end.recv().unwrap();
                let code = if matches!(msg, Message::Proceed) { 0 } else { 1 };
                std::process::exit(code);
            }
        }
    }

    #[test]
    #[serial]
    fn round_trips_failed_with_reason() {
        let (parent_end, child_end) = Channel::pair().unwrap();
        match unsafe { fork().unwrap() } {
            ForkResult::Parent { child } => {
                drop(parent_end.close());
                match waitpid(child, None).unwrap() {
                    WaitStatus::Exited(_, code) => assert_eq!(code, 0),
                    other => panic!("unexpected wait status: {other:?}"),
                }
            }
            ForkResult::Child => {
                child_end.send(&Message::Failed("mount failed".to_string())).unwrap();
                std::process::exit(0);
            }
        }
    }
}
