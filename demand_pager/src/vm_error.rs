/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use core::fmt;

/// Reasons why a virtual memory operation could not be completed.
///
/// None of these are retried: the operation that ran into one fails and
/// the caller decides what happens to the process (usually termination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// No frame is free and no frame could be evicted
    OutOfFrames,

    /// Every swap slot is in use
    SwapExhausted,

    /// Kernel memory for the bookkeeping of new pages ran out
    OutOfMemory,

    /// The address is neither backed by a page nor a valid stack growth
    InvalidAccess,

    /// Write to a read only page or fault on a present page
    ProtectionViolation,

    /// The hardware page table did not accept the mapping
    MapFailed,

    /// Disk or file transfer failed
    Io,

    /// Malformed request (misaligned address, empty length, overlap, ...)
    InvalidArgument,

    /// Shared state was locked while it should not have been
    Contended,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::OutOfFrames => "no frame available",
            VmError::SwapExhausted => "swap space exhausted",
            VmError::OutOfMemory => "out of kernel memory",
            VmError::InvalidAccess => "invalid memory access",
            VmError::ProtectionViolation => "protection violation",
            VmError::MapFailed => "could not install mapping",
            VmError::Io => "i/o error",
            VmError::InvalidArgument => "invalid argument",
            VmError::Contended => "lock contended",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for VmError {}
