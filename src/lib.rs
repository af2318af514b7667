// SPDX-License-Identifier: Apache-2.0

pub mod bounded_channel;
pub mod entry;
pub mod exporters;
pub mod init;
pub mod pipeline;
pub mod receivers;
pub mod storage;
