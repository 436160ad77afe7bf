use core::convert::TryFrom;
use core::str;

use nom::{
    bytes::complete::{tag, take},
    combinator::{map, map_opt, verify},
    error::{context, ContextError, ErrorKind, ParseError, VerboseError},
    multi::{length_data, many1},
    number::complete::{be_u16, be_u8},
    sequence::tuple,
    IResult,
};

use crate::error::DecodeError;
use crate::packet::*;

const CONTINUATION_BIT: u8 = 0x80;

/// Decodes a remaining-length varint without assuming the whole value has
/// arrived yet.
///
/// Returns `Ok(None)` when more bytes are required, and the number of bytes
/// consumed together with the decoded value otherwise.
pub fn decode_variable_length(input: &[u8]) -> Result<Option<(usize, usize)>, DecodeError> {
    let mut value = 0;
    for (i, b) in input.iter().enumerate() {
        if i >= 4 {
            return Err(DecodeError::new("remaining length exceeds four bytes"));
        }
        value += usize::from(b & !CONTINUATION_BIT) << (7 * i);
        if (b & CONTINUATION_BIT) == 0 {
            return Ok(Some((i + 1, value)));
        }
    }
    if input.len() >= 4 {
        Err(DecodeError::new("remaining length exceeds four bytes"))
    } else {
        Ok(None)
    }
}

impl FixedHeader {
    /// Decodes a fixed header from the head of a byte stream.
    ///
    /// Returns `Ok(None)` when the stream does not yet hold a complete fixed
    /// header; a malformed header is a `DecodeError`.
    pub fn decode(input: &[u8]) -> Result<Option<(usize, FixedHeader)>, DecodeError> {
        let b = match input.first() {
            Some(&b) => b,
            None => return Ok(None),
        };
        let packet_type = PacketType::try_from((b >> 4) & 0x0F)
            .map_err(|_| DecodeError::new(format!("invalid packet type {}", (b >> 4) & 0x0F)))?;
        let packet_flags = b & 0x0F;

        match decode_variable_length(&input[1..])? {
            Some((n, remaining_length)) => Ok(Some((
                n + 1,
                FixedHeader {
                    packet_type,
                    packet_flags,
                    remaining_length,
                },
            ))),
            None => Ok(None),
        }
    }
}

/// Decodes one packet from the head of a byte stream.
///
/// Returns `Ok(None)` when the stream does not yet hold a complete packet,
/// and the number of bytes consumed together with the decoded packet
/// otherwise.
pub fn decode_packet(input: &[u8]) -> Result<Option<(usize, Packet<'_>)>, DecodeError> {
    let (header_len, header) = match FixedHeader::decode(input)? {
        Some(decoded) => decoded,
        None => return Ok(None),
    };
    let packet_len = header_len + header.remaining_length;
    if input.len() < packet_len {
        return Ok(None);
    }

    match Packet::parse::<VerboseError<&[u8]>>(&input[..packet_len]) {
        Ok((_, packet)) => Ok(Some((packet_len, packet))),
        Err(err) => Err(DecodeError::new(format!(
            "fail to parse {:?} packet, {:?}",
            header.packet_type, err
        ))),
    }
}

fn variable_length<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], usize, E> {
    match decode_variable_length(input) {
        Ok(Some((n, value))) => Ok((&input[n..], value)),
        Ok(None) => Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Eof))),
        Err(_) => Err(nom::Err::Error(E::from_error_kind(
            input,
            ErrorKind::Verify,
        ))),
    }
}

impl FixedHeader {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(
            tuple((
                map_opt(be_u8, |b| -> Option<(PacketType, u8)> {
                    let packet_type = PacketType::try_from((b >> 4) & 0x0F).ok()?;
                    let packet_flags = b & 0x0F;

                    Some((packet_type, packet_flags))
                }),
                context("variable length", variable_length),
            )),
            |((packet_type, packet_flags), remaining_length)| FixedHeader {
                packet_type,
                packet_flags,
                remaining_length,
            },
        )(input)
    }
}

/// Text fields in the Control Packets described later are encoded as UTF-8 strings.
fn utf8_str<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context(
        "utf8 string",
        map_opt(length_data(be_u16), |b| str::from_utf8(b).ok()),
    )(input)
}

const CLIENT_ID_MIN_LEN: usize = 1;
const CLIENT_ID_MAX_LEN: usize = 23;
const CLIENT_ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The Client Identifier (ClientId) identifies the Client to the Server.
///
/// Each Client connecting to the Server has a unique ClientId.
/// The ClientId MUST be used by Clients and by Servers to identify state
/// that they hold relating to this MQTT Session between the Client and the Server [MQTT-3.1.3-2].
///
// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded bytes in length,
// and that contain only the characters [MQTT-3.1.3-5].
fn client_id<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context(
        "client id",
        verify(utf8_str, |s: &str| -> bool {
            (s.is_empty() || (CLIENT_ID_MIN_LEN <= s.len() && s.len() <= CLIENT_ID_MAX_LEN))
                && s.bytes().all(|b| CLIENT_ID_CHARS.contains(&b))
        }),
    )(input)
}

/// The Topic Name identifies the information channel to which payload data is published.
///
/// The label attached to an Application Message which is matched against the Subscriptions known to the Server.
/// The Server sends a copy of the Application Message to each Client that has a matching Subscription.
fn topic_name<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context(
        "topic name",
        verify(utf8_str, |s: &str| s.bytes().all(|c| c != b'#')),
    )(input)
}

/// An expression contained in a Subscription, to indicate an interest in one or more topics.
///
/// A Topic Filter can include wildcard characters.
fn topic_filter<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context("topic filter", utf8_str)(input)
}

/// A Subscription comprises a Topic Filter and a maximum QoS.
/// A Subscription is associated with a single Session.
/// A Session can contain more than one Subscription.
/// Each Subscription within a session has a different Topic Filter.
fn subscription<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], (&'a str, QoS), E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context(
        "subscription",
        tuple((
            topic_filter,
            context("QoS", map_opt(be_u8, |b| QoS::try_from(b).ok())),
        )),
    )(input)
}

fn packet_id<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], PacketId, E>
where
    E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
{
    context("packet_id", be_u16)(input)
}

impl Packet<'_> {
    pub fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Packet<'a>, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        let (input, fixed_header) = FixedHeader::parse(input)?;
        let (remaining, input) = take(fixed_header.remaining_length)(input)?;

        match fixed_header.packet_type {
            PacketType::Connect => map(Connect::parse, Packet::Connect)(input),
            PacketType::ConnAck => map(ConnectAck::parse, Packet::ConnectAck)(input),
            PacketType::Publish => map(
                |i| Publish::parse(fixed_header.packet_flags, i),
                Packet::Publish,
            )(input),
            PacketType::PubAck => map(PublishAck::parse, Packet::PublishAck)(input),
            PacketType::PubRec => map(PublishReceived::parse, Packet::PublishReceived)(input),
            PacketType::PubRel => map(PublishRelease::parse, Packet::PublishRelease)(input),
            PacketType::PubComp => map(PublishComplete::parse, Packet::PublishComplete)(input),
            PacketType::Subscribe => map(Subscribe::parse, Packet::Subscribe)(input),
            PacketType::SubAck => map(SubscribeAck::parse, Packet::SubscribeAck)(input),
            PacketType::Unsubscribe => map(Unsubscribe::parse, Packet::Unsubscribe)(input),
            PacketType::UnsubAck => map(UnsubscribeAck::parse, Packet::UnsubscribeAck)(input),
            PacketType::PingReq => Ok((remaining, Packet::Ping)),
            PacketType::PingResp => Ok((remaining, Packet::Pong)),
            PacketType::Disconnect => Ok((remaining, Packet::Disconnect)),
        }
    }
}

impl Connect<'_> {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Connect<'a>, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        let (input, (_, _, flags, keep_alive)) = tuple((
            context("protocol name", tag(PROTOCOL_NAME)),
            context(
                "protocol level",
                verify(be_u8, |&level| level == PROTOCOL_LEVEL),
            ),
            context("flags", map_opt(be_u8, ConnectFlags::from_bits)),
            context("keepalive", be_u16),
        ))(input)?;
        let (input, client_id) = client_id(input)?;
        let (input, last_will) = if flags.contains(ConnectFlags::LAST_WILL) {
            let qos = QoS::try_from((flags & ConnectFlags::WILL_QOS).bits() >> WILL_QOS_SHIFT)
                .map_err(|_| {
                    nom::Err::Error(E::from_error_kind(input, ErrorKind::Verify))
                })?;
            let (input, (topic, message)) = tuple((
                context("will topic", utf8_str),
                context("will message", length_data(be_u16)),
            ))(input)?;

            (
                input,
                Some(LastWill {
                    qos,
                    retain: flags.contains(ConnectFlags::WILL_RETAIN),
                    topic,
                    message,
                }),
            )
        } else {
            (input, None)
        };
        let (input, username) = if flags.contains(ConnectFlags::USERNAME) {
            context("username", map(utf8_str, Some))(input)?
        } else {
            (input, None)
        };
        let (input, password) = if flags.contains(ConnectFlags::PASSWORD) {
            context("password", map(length_data(be_u16), Some))(input)?
        } else {
            (input, None)
        };

        Ok((
            input,
            Connect {
                clean_session: flags.contains(ConnectFlags::CLEAN_SESSION),
                keep_alive,
                client_id,
                last_will,
                username,
                password,
            },
        ))
    }
}

impl ConnectAck {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(
            tuple((
                context("flags", map_opt(be_u8, ConnectAckFlags::from_bits)),
                context(
                    "return code",
                    map_opt(be_u8, |b| ConnectReturnCode::try_from(b).ok()),
                ),
            )),
            |(flags, return_code)| ConnectAck {
                session_present: flags.contains(ConnectAckFlags::SESSION_PRESENT),
                return_code,
            },
        )(input)
    }
}

impl Publish<'_> {
    fn parse<'a, E>(packet_flags: u8, input: &'a [u8]) -> IResult<&'a [u8], Publish<'a>, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        let flags = PublishFlags::from_bits_truncate(packet_flags);
        let dup = flags.contains(PublishFlags::DUP);
        // QoS bits 0b11 are a malformed packet [MQTT-3.3.1-4].
        let qos = QoS::try_from((flags & PublishFlags::QOS).bits() >> PUBLISH_QOS_SHIFT)
            .map_err(|_| nom::Err::Error(E::from_error_kind(input, ErrorKind::Verify)))?;
        let retain = flags.contains(PublishFlags::RETAIN);
        let (input, topic) = topic_name(input)?;
        let (payload, packet_id) = if qos >= QoS::AtLeastOnce {
            map(packet_id, Some)(input)?
        } else {
            (input, None)
        };

        Ok((
            &[][..],
            Publish {
                dup,
                qos,
                retain,
                topic,
                packet_id,
                payload,
            },
        ))
    }
}

impl PublishAck {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(packet_id, |packet_id| Self { packet_id })(input)
    }
}

impl PublishReceived {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(packet_id, |packet_id| Self { packet_id })(input)
    }
}

impl PublishRelease {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(packet_id, |packet_id| Self { packet_id })(input)
    }
}

impl PublishComplete {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(packet_id, |packet_id| Self { packet_id })(input)
    }
}

impl Subscribe<'_> {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Subscribe<'a>, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(
            tuple((packet_id, many1(subscription))),
            |(packet_id, subscriptions)| Subscribe {
                packet_id,
                subscriptions,
            },
        )(input)
    }
}

impl SubscribeAck {
    const QOS_MASK: u8 = 0x3;

    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(
            tuple((
                packet_id,
                many1(context(
                    "return code",
                    map_opt(be_u8, |b| {
                        if (b & SubscribeReturnCode::FAILURE) == 0 {
                            QoS::try_from(b & Self::QOS_MASK)
                                .ok()
                                .map(SubscribeReturnCode::Success)
                        } else {
                            Some(SubscribeReturnCode::Failure)
                        }
                    }),
                )),
            )),
            |(packet_id, status)| SubscribeAck { packet_id, status },
        )(input)
    }
}

impl Unsubscribe<'_> {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Unsubscribe<'a>, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(
            tuple((packet_id, many1(topic_filter))),
            |(packet_id, topic_filters)| Unsubscribe {
                packet_id,
                topic_filters,
            },
        )(input)
    }
}

impl UnsubscribeAck {
    fn parse<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Self, E>
    where
        E: ParseError<&'a [u8]> + ContextError<&'a [u8]>,
    {
        map(packet_id, |packet_id| Self { packet_id })(input)
    }
}
