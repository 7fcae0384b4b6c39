//! # Message Codec
//!
//! Every MINIX system call travels in a fixed-layout message: a two-field
//! header (`source`, `type`) followed by one of six payload shapes
//! (`spec.md` §3). The message is not self-describing — the dispatcher
//! and each syscall handler must already know which shape a given call
//! number uses, and name it explicitly at the call site.
//!
//! Rather than model this as a C-style union (which would make an
//! out-of-shape field access a silent bug), this module keeps the wire
//! bytes as the single source of truth and exposes each shape through its
//! own typed accessors (`spec.md` §9, "Polymorphic message payload"). A
//! field is only ever interpreted once, at the point it is read, so there
//! is no separate "swapped" copy to drift out of sync with the raw bytes —
//! reading a field performs the big-endian-to-host conversion on the spot,
//! and writing performs the reverse, which satisfies the same contract the
//! spec describes ("swapped to host order before any field is read, and to
//! guest order before it is written back into RAM") without risking a
//! partially-swapped buffer.


/// Total wire size of a message. The header is 4 bytes; the widest payload
/// shape (`mess3`, two 16-bit ints + one pointer + 14 inline bytes) is 22
/// bytes, for 26 bytes total, rounded up to a 4-byte boundary to match the
/// alignment of the pointer-sized fields embedded in every other shape.
pub const MESSAGE_SIZE: usize = 28;

const OFF_SOURCE: usize = 0;
const OFF_TYPE: usize = 2;
const OFF_PAYLOAD: usize = 4;

/// A fixed-layout MINIX IPC message, still in its on-the-wire big-endian
/// byte form.
#[derive(Clone, Copy)]
pub struct Message {
    bytes: [u8; MESSAGE_SIZE],
}

fn get_i16(bytes: &[u8], off: usize) -> i16 {
    i16::from_be_bytes([bytes[off], bytes[off + 1]])
}

fn put_i16(bytes: &mut [u8], off: usize, value: i16) {
    bytes[off..off + 2].copy_from_slice(&value.to_be_bytes());
}

fn get_i32(bytes: &[u8], off: usize) -> i32 {
    i32::from_be_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn put_i32(bytes: &mut [u8], off: usize, value: i32) {
    bytes[off..off + 4].copy_from_slice(&value.to_be_bytes());
}

fn get_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_be_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn put_u32(bytes: &mut [u8], off: usize, value: u32) {
    bytes[off..off + 4].copy_from_slice(&value.to_be_bytes());
}

impl Message {
    pub fn zeroed() -> Self {
        Self {
            bytes: [0u8; MESSAGE_SIZE],
        }
    }

    /// Builds a message view over raw wire bytes copied out of guest RAM.
    pub fn from_wire_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MESSAGE_SIZE];
        let n = bytes.len().min(MESSAGE_SIZE);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self { bytes: buf }
    }

    /// Returns the raw wire bytes, ready to be copied back into guest RAM.
    pub fn as_wire_bytes(&self) -> &[u8; MESSAGE_SIZE] {
        &self.bytes
    }

    /// Clears the entire message (header and payload) to zero, per
    /// `spec.md` §4.3 ("the `Clear` routine zeros the entire message").
    pub fn clear(&mut self) {
        self.bytes = [0u8; MESSAGE_SIZE];
    }

    pub fn source(&self) -> i16 {
        get_i16(&self.bytes, OFF_SOURCE)
    }

    pub fn set_source(&mut self, value: i16) {
        put_i16(&mut self.bytes, OFF_SOURCE, value);
    }

    pub fn m_type(&self) -> i16 {
        get_i16(&self.bytes, OFF_TYPE)
    }

    pub fn set_m_type(&mut self, value: i16) {
        put_i16(&mut self.bytes, OFF_TYPE, value);
    }

    /// `mess1`: three 16-bit ints, three 32-bit guest-pointers.
    pub fn mess1(&self) -> Mess1 {
        Mess1(self)
    }
    pub fn mess1_mut(&mut self) -> Mess1Mut {
        Mess1Mut(self)
    }

    /// `mess2`: three 16-bit ints, two 32-bit longs, one 32-bit guest-pointer.
    pub fn mess2(&self) -> Mess2 {
        Mess2(self)
    }
    pub fn mess2_mut(&mut self) -> Mess2Mut {
        Mess2Mut(self)
    }

    /// `mess3`: two 16-bit ints, one 32-bit guest-pointer, 14 inline bytes.
    pub fn mess3(&self) -> Mess3 {
        Mess3(self)
    }
    pub fn mess3_mut(&mut self) -> Mess3Mut {
        Mess3Mut(self)
    }

    /// `mess4`: four 32-bit longs.
    pub fn mess4(&self) -> Mess4 {
        Mess4(self)
    }
    pub fn mess4_mut(&mut self) -> Mess4Mut {
        Mess4Mut(self)
    }

    /// `mess5`: two 8-bit chars, two 16-bit ints, three 32-bit longs.
    pub fn mess5(&self) -> Mess5 {
        Mess5(self)
    }
    pub fn mess5_mut(&mut self) -> Mess5Mut {
        Mess5Mut(self)
    }

    /// `mess6`: three 16-bit ints, one 32-bit long, one 32-bit
    /// guest-function-pointer.
    pub fn mess6(&self) -> Mess6 {
        Mess6(self)
    }
    pub fn mess6_mut(&mut self) -> Mess6Mut {
        Mess6Mut(self)
    }
}

macro_rules! shape_view {
    ($view:ident, $viewmut:ident) => {
        pub struct $view<'a>(&'a Message);
        pub struct $viewmut<'a>(&'a mut Message);
    };
}

shape_view!(Mess1, Mess1Mut);
shape_view!(Mess2, Mess2Mut);
shape_view!(Mess3, Mess3Mut);
shape_view!(Mess4, Mess4Mut);
shape_view!(Mess5, Mess5Mut);
shape_view!(Mess6, Mess6Mut);

impl<'a> Mess1<'a> {
    pub fn i1(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD)
    }
    pub fn i2(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 2)
    }
    pub fn i3(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn p1(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 6)
    }
    pub fn p2(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 10)
    }
    pub fn p3(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 14)
    }
}
impl<'a> Mess1Mut<'a> {
    pub fn set_i1(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD, v);
    }
    pub fn set_i2(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 2, v);
    }
    pub fn set_i3(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_p1(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 6, v);
    }
    pub fn set_p2(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 10, v);
    }
    pub fn set_p3(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 14, v);
    }
}

impl<'a> Mess2<'a> {
    pub fn i1(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD)
    }
    pub fn i2(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 2)
    }
    pub fn i3(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn l1(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 6)
    }
    pub fn l2(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 10)
    }
    pub fn p1(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 14)
    }
}
impl<'a> Mess2Mut<'a> {
    pub fn set_i1(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD, v);
    }
    pub fn set_i2(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 2, v);
    }
    pub fn set_i3(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_l1(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 6, v);
    }
    pub fn set_l2(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 10, v);
    }
    pub fn set_p1(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 14, v);
    }
}

impl<'a> Mess3<'a> {
    pub fn i1(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD)
    }
    pub fn i2(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 2)
    }
    pub fn p1(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes[OFF_PAYLOAD + 8..OFF_PAYLOAD + 8 + 14]
    }
}
impl<'a> Mess3Mut<'a> {
    pub fn set_i1(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD, v);
    }
    pub fn set_i2(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 2, v);
    }
    pub fn set_p1(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_bytes(&mut self, data: &[u8]) {
        let n = data.len().min(14);
        let start = OFF_PAYLOAD + 8;
        self.0.bytes[start..start + n].copy_from_slice(&data[..n]);
    }
}

impl<'a> Mess4<'a> {
    pub fn l1(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD)
    }
    pub fn l2(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn l3(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 8)
    }
    pub fn l4(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 12)
    }
}
impl<'a> Mess4Mut<'a> {
    pub fn set_l1(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD, v);
    }
    pub fn set_l2(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_l3(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 8, v);
    }
    pub fn set_l4(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 12, v);
    }
}

impl<'a> Mess5<'a> {
    pub fn c1(&self) -> i8 {
        self.0.bytes[OFF_PAYLOAD] as i8
    }
    pub fn c2(&self) -> i8 {
        self.0.bytes[OFF_PAYLOAD + 1] as i8
    }
    pub fn i1(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 2)
    }
    pub fn i2(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn l1(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 6)
    }
    pub fn l2(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 10)
    }
    pub fn l3(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 14)
    }
}
impl<'a> Mess5Mut<'a> {
    pub fn set_c1(&mut self, v: i8) {
        self.0.bytes[OFF_PAYLOAD] = v as u8;
    }
    pub fn set_c2(&mut self, v: i8) {
        self.0.bytes[OFF_PAYLOAD + 1] = v as u8;
    }
    pub fn set_i1(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 2, v);
    }
    pub fn set_i2(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_l1(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 6, v);
    }
    pub fn set_l2(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 10, v);
    }
    pub fn set_l3(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 14, v);
    }
}

impl<'a> Mess6<'a> {
    pub fn i1(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD)
    }
    pub fn i2(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 2)
    }
    pub fn i3(&self) -> i16 {
        get_i16(&self.0.bytes, OFF_PAYLOAD + 4)
    }
    pub fn l1(&self) -> i32 {
        get_i32(&self.0.bytes, OFF_PAYLOAD + 6)
    }
    pub fn fp(&self) -> u32 {
        get_u32(&self.0.bytes, OFF_PAYLOAD + 10)
    }
}
impl<'a> Mess6Mut<'a> {
    pub fn set_i1(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD, v);
    }
    pub fn set_i2(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 2, v);
    }
    pub fn set_i3(&mut self, v: i16) {
        put_i16(&mut self.0.bytes, OFF_PAYLOAD + 4, v);
    }
    pub fn set_l1(&mut self, v: i32) {
        put_i32(&mut self.0.bytes, OFF_PAYLOAD + 6, v);
    }
    pub fn set_fp(&mut self, v: u32) {
        put_u32(&mut self.0.bytes, OFF_PAYLOAD + 10, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_zeroes_everything() {
        let mut m = Message::zeroed();
        m.set_source(5);
        m.set_m_type(12);
        m.mess1_mut().set_p1(0xDEAD_BEEF);
        m.clear();
        assert_eq!(m.source(), 0);
        assert_eq!(m.m_type(), 0);
        assert_eq!(m.mess1().p1(), 0);
    }

    #[test]
    fn mess1_roundtrip() {
        let mut m = Message::zeroed();
        m.set_source(1);
        m.set_m_type(5);
        {
            let mut v = m.mess1_mut();
            v.set_i1(-1);
            v.set_i2(2);
            v.set_i3(3);
            v.set_p1(0x1000);
            v.set_p2(0x2000);
            v.set_p3(0x3000);
        }
        assert_eq!(m.source(), 1);
        assert_eq!(m.m_type(), 5);
        let v = m.mess1();
        assert_eq!((v.i1(), v.i2(), v.i3()), (-1, 2, 3));
        assert_eq!((v.p1(), v.p2(), v.p3()), (0x1000, 0x2000, 0x3000));
    }

    #[test]
    fn mess3_inline_bytes_roundtrip() {
        let mut m = Message::zeroed();
        m.mess3_mut().set_bytes(b"hello.c");
        assert_eq!(&m.mess3().bytes()[..7], b"hello.c");
        assert_eq!(m.mess3().bytes()[7], 0);
    }

    #[test]
    fn unmodified_fields_survive_a_field_edit() {
        let mut m = Message::zeroed();
        m.set_source(42);
        m.mess4_mut().set_l2(7);
        m.mess4_mut().set_l4(9);
        assert_eq!(m.source(), 42);
        assert_eq!(m.mess4().l1(), 0);
        assert_eq!(m.mess4().l2(), 7);
        assert_eq!(m.mess4().l3(), 0);
        assert_eq!(m.mess4().l4(), 9);
    }

    #[test]
    fn wire_bytes_roundtrip_through_ram_like_buffer() {
        let mut m = Message::zeroed();
        m.set_source(-9);
        m.set_m_type(3);
        m.mess6_mut().set_fp(0x0040_1000);
        let wire = *m.as_wire_bytes();
        let m2 = Message::from_wire_bytes(&wire);
        assert_eq!(m2.source(), -9);
        assert_eq!(m2.m_type(), 3);
        assert_eq!(m2.mess6().fp(), 0x0040_1000);
    }
}
