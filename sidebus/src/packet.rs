//! side-info 包：一帧对应的全部条目（以 PTS 索引）

use std::fmt;

use crate::entry::{payload_bytes, try_clone_entries, SideEntry};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SidePacket {
    /// 通常等于画面的显示时间戳
    pub pts: i64,
    /// 编码器 ID，总线不解释
    pub codec_id: i32,
    pub entries: Vec<SideEntry>,
}

impl SidePacket {
    pub fn new(pts: i64, codec_id: i32) -> Self {
        Self {
            pts,
            codec_id,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: SideEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// 深拷贝整包
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            pts: self.pts,
            codec_id: self.codec_id,
            entries: try_clone_entries(&self.entries)?,
        })
    }

    /// 取走条目，交给调用方释放
    pub fn into_entries(self) -> Vec<SideEntry> {
        self.entries
    }

    pub fn payload_bytes(&self) -> usize {
        payload_bytes(&self.entries)
    }
}

impl fmt::Display for SidePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pts={} codec={} entries={} bytes={}",
            self.pts,
            self.codec_id,
            self.entries.len(),
            self.payload_bytes()
        )?;
        for entry in &self.entries {
            writeln!(f, "  {}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::kind;

    #[test]
    fn test_packet_clone_and_take() {
        let packet = SidePacket::new(80_000, 27)
            .with_entry(SideEntry::new(kind::MOTION_VECTORS, vec![7; 32]))
            .with_entry(SideEntry::new(kind::QP_TABLE, vec![26; 5]).with_flags(1));
        assert_eq!(packet.payload_bytes(), 37);

        let copy = packet.try_clone().unwrap();
        assert_eq!(copy, packet);
        assert_ne!(copy.entries[0].data.as_ptr(), packet.entries[0].data.as_ptr());

        let entries = copy.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].flags, 1);
        assert_eq!(packet.entries.len(), 2);
    }
}
