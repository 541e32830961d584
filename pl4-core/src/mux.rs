use pl4_types::{DecodedPacket, Emission, HighRateSample, LowRateSample};

use crate::clock::PacketTimestamps;

/// Накапливает выборки цикла в два потока и отдаёт их вместе.
#[derive(Debug, Default)]
pub struct StreamMultiplexer {
    pending: Emission,
}

impl StreamMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет пакет: 4 выборки в быстрый поток, 1 в медленный.
    pub fn push(
        &mut self,
        packet: &DecodedPacket,
        ts: &PacketTimestamps,
    ) {
        for (k, &timestamp_ns) in ts.high_ns.iter().enumerate() {
            self.pending.high.push(HighRateSample {
                timestamp_ns,
                counter: packet.counter,
                ch1: packet.ch1[k],
                ch2: packet.ch2[k],
            });
        }

        self.pending.low.push(LowRateSample {
            timestamp_ns: ts.low_ns,
            counter: packet.counter,
            ch3: packet.ch3,
            ch4: packet.ch4,
        });
    }

    /// Сколько пакетов ждут отправки.
    pub fn pending_packets(&self) -> usize {
        self.pending.packet_count()
    }

    /// Отбрасывает накопленное. Возвращает число отброшенных пакетов.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending_packets();
        self.pending = Emission::default();
        dropped
    }

    /// Забирает оба потока. `None`, если в цикле не было ни одного пакета.
    pub fn take(&mut self) -> Option<Emission> {
        if self.pending.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.pending))
    }
}
