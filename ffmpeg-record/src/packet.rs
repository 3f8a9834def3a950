use ffmpeg_next::Rational;

/// A compressed packet together with the time base its timestamps are in.
pub struct EncodedPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl EncodedPacket {
    /// Packet carrying a copy of `data`, used by synthetic encoders.
    pub fn from_data(data: &[u8], pts: i64, dts: i64, time_base: Rational) -> Self {
        let mut packet = ffmpeg_next::codec::packet::Packet::copy(data);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(dts));
        Self { packet, time_base }
    }

    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn duration(&self) -> i64 {
        self.packet.duration()
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.packet.set_duration(duration);
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Converts pts, dts and duration into `time_base`.
    pub fn rescale_to(&mut self, time_base: Rational) {
        if self.time_base != time_base {
            self.packet.rescale_ts(self.time_base, time_base);
            self.time_base = time_base;
        }
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }
}

impl From<(ffmpeg_next::codec::packet::Packet, Rational)> for EncodedPacket {
    fn from((packet, time_base): (ffmpeg_next::codec::packet::Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}
