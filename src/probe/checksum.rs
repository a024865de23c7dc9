/// Compute the ICMP header checksum over `data` (header followed by body).
///
/// Words are summed in little-endian order, so the folded and inverted sum is
/// byte-swapped at the end. The returned value goes into the header as a
/// big-endian u16. An odd trailing byte is treated as a zero-padded word.
///
/// Running this over a packet that already carries a correct checksum
/// yields 0.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        let value = u16::from_le_bytes([word[0], word[1]]) as u32;
        sum = sum.wrapping_add(value);
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(*last as u32);
    }

    // Two folds absorb any carry produced by the first
    sum = (sum >> 16) + (sum & 0xFFFF);
    sum = (sum >> 16) + sum;

    let answer = !sum as u16;
    answer.swap_bytes()
}
